//! Per-receiver priority queue set.

use crate::bus::domain::{Message, Priority};
use std::collections::VecDeque;

/// Five FIFO queues, one per urgency tier.
///
/// `pop` drains CRITICAL before HIGH before MEDIUM before LOW before INFO,
/// preserving FIFO order within a tier.
#[derive(Debug, Default)]
pub(super) struct PriorityQueues {
    critical: VecDeque<Message>,
    high: VecDeque<Message>,
    medium: VecDeque<Message>,
    low: VecDeque<Message>,
    info: VecDeque<Message>,
}

impl PriorityQueues {
    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<Message> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
            Priority::Info => &mut self.info,
        }
    }

    pub(super) fn push(&mut self, message: Message) {
        self.lane_mut(message.priority()).push_back(message);
    }

    pub(super) fn pop(&mut self) -> Option<Message> {
        for priority in Priority::ALL {
            if let Some(message) = self.lane_mut(priority).pop_front() {
                return Some(message);
            }
        }
        None
    }

    pub(super) fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.medium.len() + self.low.len() + self.info.len()
    }
}
