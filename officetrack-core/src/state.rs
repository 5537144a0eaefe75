use parking_lot::RwLock;
use std::sync::Arc;

pub type Shared<T> = Arc<RwLock<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// User-chosen name, written by the UI side and read by each presence cycle
#[derive(Debug, Clone, Default)]
pub struct DisplayName {
    inner: Shared<String>,
}

impl DisplayName {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: new_state(initial.into()),
        }
    }

    pub fn set(&self, name: impl Into<String>) {
        *self.inner.write() = name.into();
    }

    pub fn get(&self) -> String {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::normalize_display_name;

    #[test]
    fn test_clones_share_the_name() {
        let ui_side = DisplayName::default();
        let service_side = ui_side.clone();

        assert_eq!(normalize_display_name(&service_side.get()), "Unknown");
        ui_side.set("Alice");
        assert_eq!(service_side.get(), "Alice");
        assert_eq!(normalize_display_name(&service_side.get()), "Alice");
    }
}
