use std::collections::HashMap;

/// Immutable meter-id to device-number lookup, built once from configuration.
///
/// Every reporting meter must be present; an unknown id is a hard error at
/// unpivot time, never a silently skipped record.
#[derive(Debug, Clone, Default)]
pub struct DeviceMap {
    inner: HashMap<String, i32>,
}

impl DeviceMap {
    pub fn new(inner: HashMap<String, i32>) -> Self {
        Self { inner }
    }

    pub fn get(&self, meter_id: &str) -> Option<i32> {
        self.inner.get(meter_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, i32>> for DeviceMap {
    fn from(inner: HashMap<String, i32>) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_meter() {
        let map = DeviceMap::from(HashMap::from([("shellypro3em-a1".to_string(), 7)]));
        assert_eq!(map.get("shellypro3em-a1"), Some(7));
    }

    #[test]
    fn unknown_meter_is_none() {
        let map = DeviceMap::default();
        assert_eq!(map.get("nope"), None);
        assert!(map.is_empty());
    }
}
