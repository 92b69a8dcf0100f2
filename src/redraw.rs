//! Redraw Coordination - Latest Frame Wins
//!
//! Every visible change requests a new frame. Frames may be produced out of
//! order (slow image decode for an old state, fast one for a newer state);
//! a generation counter makes sure only the frame for the most recent request
//! is ever shown.

use log::debug;

use crate::render::Surface;

/// Handle for one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    generation: u64,
}

impl FrameTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The displayed surface of the editor or preview.
#[derive(Debug, Default)]
pub struct LiveSurface {
    requested: u64,
    presented: Option<u64>,
    surface: Option<Surface>,
}

impl LiveSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state change. Any frame from an earlier ticket becomes stale.
    pub fn request(&mut self) -> FrameTicket {
        self.requested = self.requested.wrapping_add(1);
        FrameTicket {
            generation: self.requested,
        }
    }

    pub fn is_current(&self, ticket: FrameTicket) -> bool {
        ticket.generation == self.requested
    }

    /// Show `surface` if `ticket` is still the latest request.
    ///
    /// Returns whether the frame was accepted.
    pub fn present(&mut self, ticket: FrameTicket, surface: Surface) -> bool {
        if !self.is_current(ticket) {
            debug!(
                "Discarding stale frame {} (latest request is {})",
                ticket.generation, self.requested
            );
            return false;
        }
        self.presented = Some(ticket.generation);
        self.surface = Some(surface);
        true
    }

    /// True while a requested frame has not been presented.
    pub fn is_pending(&self) -> bool {
        self.presented != Some(self.requested)
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.requested
    }
}
