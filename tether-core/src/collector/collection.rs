//! Ordered, id-keyed message collection

use std::collections::HashMap;

use super::target::CollectedMessage;

/// Messages in arrival order, keyed by message id.
///
/// Inserting an id that is already present replaces the message in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    messages: Vec<CollectedMessage>,
    index: HashMap<String, usize>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message`, returning true when its id was new.
    pub fn insert(&mut self, message: CollectedMessage) -> bool {
        match self.index.get(&message.id) {
            Some(&position) => {
                self.messages[position] = message;
                false
            }
            None => {
                self.index.insert(message.id.clone(), self.messages.len());
                self.messages.push(message);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CollectedMessage> {
        self.index.get(id).map(|&position| &self.messages[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedMessage> {
        self.messages.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|message| message.id.as_str())
    }

    pub fn into_vec(self) -> Vec<CollectedMessage> {
        self.messages
    }
}

impl IntoIterator for Collection {
    type Item = CollectedMessage;
    type IntoIter = std::vec::IntoIter<CollectedMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
