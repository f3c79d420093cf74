use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Invertible map between player names and dense ids in `0..len()`.
/// Ids follow the lexicographic order of the names, so fitting the same set
/// of names always produces the same encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "EncoderClasses", into = "EncoderClasses")]
pub struct PlayerEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct EncoderClasses {
    classes: Vec<String>,
}

impl From<EncoderClasses> for PlayerEncoder {
    fn from(persisted: EncoderClasses) -> Self {
        Self::from_sorted_classes(persisted.classes)
    }
}

impl From<PlayerEncoder> for EncoderClasses {
    fn from(encoder: PlayerEncoder) -> Self {
        Self {
            classes: encoder.classes,
        }
    }
}

impl PlayerEncoder {
    pub fn fit<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut classes: Vec<String> = names.into_iter().map(|s| s.as_ref().to_string()).collect();
        classes.sort_unstable();
        classes.dedup();
        Self::from_sorted_classes(classes)
    }

    fn from_sorted_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Self { classes, index }
    }

    /// Number of distinct players.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownPlayer(name.to_string()))
    }

    pub fn inverse_transform(&self, id: usize) -> Result<&str> {
        self.classes
            .get(id)
            .map(String::as_str)
            .ok_or(Error::UnknownPlayerId(id))
    }
}
