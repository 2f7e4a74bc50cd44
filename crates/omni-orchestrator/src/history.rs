use std::collections::VecDeque;

use omni_types::AgentMessage;

/// Bounded in-process history of every request/response that has crossed
/// `send_to_agent`. Oldest entries are dropped once `cap` is exceeded.
pub struct HistoryRing {
    entries: VecDeque<AgentMessage>,
    cap: usize,
}

impl HistoryRing {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap,
        }
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.entries.push_back(message);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<AgentMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
