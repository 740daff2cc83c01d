//! Lines produced while handling one event, waiting to be written out.
//!
//! Game and lobby logic never touch sockets. They queue replies and pushes
//! here, and the network layer delivers them once the event is processed.
//! Lines are stored without their trailing newline.

use crate::client_manager::ClientId;

#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(ClientId, String)>,
    closing: Vec<ClientId>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ClientId, line: impl ToString) {
        self.messages.push((to, line.to_string()));
    }

    /// Queues the same line for every recipient
    pub fn send_all(&mut self, to: impl IntoIterator<Item = ClientId>, line: impl ToString) {
        let line = line.to_string();
        for client_id in to {
            self.messages.push((client_id, line.clone()));
        }
    }

    /// Asks the network layer to close this connection after flushing it
    pub fn close(&mut self, client_id: ClientId) {
        if !self.closing.contains(&client_id) {
            self.closing.push(client_id);
        }
    }

    pub fn messages(&self) -> &[(ClientId, String)] {
        &self.messages
    }

    /// Lines queued for one client, in order
    pub fn lines_for(&self, client_id: ClientId) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|(to, _)| *to == client_id)
            .map(|(_, line)| line.as_str())
            .collect()
    }

    pub fn closing(&self) -> &[ClientId] {
        &self.closing
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.closing.is_empty()
    }

    pub fn take_messages(&mut self) -> Vec<(ClientId, String)> {
        std::mem::take(&mut self.messages)
    }

    pub fn take_closing(&mut self) -> Vec<ClientId> {
        std::mem::take(&mut self.closing)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.closing.clear();
    }
}
