use std::fmt;

/// Уведомление об изменении ключа общего хранилища.
///
/// Приходит только в контексты, отличные от записавшего.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StorageEvent {
    pub fn new(key: impl Into<String>, old_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
        }
    }

    pub fn is_for(&self, key: &str) -> bool {
        self.key == key
    }

    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

impl fmt::Display for StorageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = |v: &Option<String>| v.as_ref().map(|s| s.len()).unwrap_or(0);
        if self.is_removal() {
            write!(f, "'{}' удалён ({} байт было)", self.key, len(&self.old_value))
        } else {
            write!(
                f,
                "'{}' изменён ({} -> {} байт)",
                self.key,
                len(&self.old_value),
                len(&self.new_value)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_event_helpers() {
        let event = StorageEvent::new("windows", None, Some("[]".to_string()));
        assert!(event.is_for("windows"));
        assert!(!event.is_for("windowId"));
        assert!(!event.is_removal());

        let removal = StorageEvent::new("windows", Some("[]".to_string()), None);
        assert!(removal.is_removal());
        assert_eq!(removal.to_string(), "'windows' удалён (2 байт было)");
    }
}
