use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureBinding {
    pub key: String,
    pub path: String,
}

/// One texture set to configure: texture keys mapped to source files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSetTask {
    pub name: String,
    pub bindings: Vec<TextureBinding>,
}

impl TextureSetTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Adds or replaces the binding for `key`. A replaced key keeps the
    /// position of its first occurrence. Returns true when a binding was
    /// replaced.
    pub fn bind(&mut self, key: impl Into<String>, path: impl Into<String>) -> bool {
        let key = key.into();
        let path = path.into();
        match self.bindings.iter_mut().find(|b| b.key == key) {
            Some(existing) => {
                existing.path = path;
                true
            }
            None => {
                self.bindings.push(TextureBinding { key, path });
                false
            }
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.key.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_replaces_path_in_place() {
        let mut task = TextureSetTask::new("Body");
        assert!(!task.bind("BaseColor", "a.png"));
        assert!(!task.bind("Normal", "n.png"));
        assert!(task.bind("BaseColor", "b.png"));
        assert_eq!(task.keys(), vec!["BaseColor", "Normal"]);
        assert_eq!(task.bindings[0].path, "b.png");
    }
}
