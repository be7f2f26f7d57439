//! Local notification list with reconciliation helpers.
//!
//! Single-writer store backing the notification stream client. The list is
//! kept in display order (newest first), de-duplicated by id, and supports the
//! optimistic mutation/rollback dance for mark-as-read and delete. The unread
//! count is always recomputed from the list, never tracked separately, so it
//! cannot drift.

use crate::notification::Notification;
use std::cmp::Ordering;

/// Outcome of ingesting one push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The notification was new and has been inserted in display order.
    Inserted,
    /// A notification with the same id existed; its fields were replaced.
    Replaced,
}

/// Immutable view of the list published to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSnapshot {
    /// Notifications in display order.
    pub items: Vec<Notification>,
}

impl NotificationSnapshot {
    /// Count of unread notifications, derived from the items on every call.
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ordered, de-duplicated notification list.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count of unread notifications, recomputed from the list.
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn get(&self, id: u64) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    /// Ingest one push event: upsert keyed on id. A redelivered id replaces
    /// the stored fields instead of duplicating the entry, and moves the entry
    /// when the redelivery carries a different timestamp.
    pub fn ingest(&mut self, notification: Notification) -> Ingest {
        match self.items.iter().position(|n| n.id == notification.id) {
            Some(pos) => {
                if self.items[pos].created_at == notification.created_at {
                    self.items[pos] = notification;
                } else {
                    self.items.remove(pos);
                    self.insert_sorted(notification);
                }
                Ingest::Replaced
            }
            None => {
                self.insert_sorted(notification);
                Ingest::Inserted
            }
        }
    }

    /// Replace the whole list with a server snapshot. The snapshot is
    /// re-sorted into display order; if the server reports the same id twice,
    /// the last occurrence wins.
    pub fn sync(&mut self, snapshot: Vec<Notification>) {
        self.items.clear();
        for notification in snapshot {
            self.ingest(notification);
        }
    }

    /// Set the read flag, returning whether the flag actually changed.
    pub fn set_read(&mut self, id: u64, read: bool) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if n.is_read != read => {
                n.is_read = read;
                true
            }
            _ => false,
        }
    }

    /// Mark a notification read (the optimistic half of mark-as-read).
    pub fn mark_read(&mut self, id: u64) -> bool {
        self.set_read(id, true)
    }

    /// Remove a notification, returning it so a rejected delete can restore it.
    pub fn remove(&mut self, id: u64) -> Option<Notification> {
        let pos = self.items.iter().position(|n| n.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Re-insert a previously removed notification at its display-order
    /// position (delete rollback). A redelivery may have raced the rollback;
    /// the entry already present wins.
    pub fn restore(&mut self, notification: Notification) {
        if self.items.iter().any(|n| n.id == notification.id) {
            return;
        }
        self.insert_sorted(notification);
    }

    /// Drop all notifications (session teardown).
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Clone the current list into a publishable view.
    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            items: self.items.clone(),
        }
    }

    fn insert_sorted(&mut self, notification: Notification) {
        let pos = self
            .items
            .partition_point(|n| n.display_order(&notification) == Ordering::Less);
        self.items.insert(pos, notification);
    }
}
