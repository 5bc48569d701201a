//! Who may see and change what.

use uuid::Uuid;

/// What the visibility and ownership checks need to know about one event,
/// from the point of view of one caller.
#[derive(Debug, Clone, Copy)]
pub struct EventAccess {
    pub is_public: bool,
    pub organizer_id: Uuid,
    /// Whether the caller is on the event's invite list.
    pub invited: bool,
}

impl EventAccess {
    /// Public events are visible to everyone. Private ones only to their
    /// organizer and invitees.
    pub fn can_view(&self, viewer: Option<Uuid>) -> bool {
        self.is_public || viewer.is_some_and(|id| id == self.organizer_id || self.invited)
    }

    pub fn can_modify(&self, viewer: Uuid) -> bool {
        viewer == self.organizer_id
    }
}

/// Records owned by a user (their RSVP) may only be changed by that user.
pub fn can_edit_own(owner: Uuid, viewer: Uuid) -> bool {
    owner == viewer
}
