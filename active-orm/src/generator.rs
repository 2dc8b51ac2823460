//! Application-side primary key generation.

use std::fmt::Debug;

use uuid::Uuid;

use crate::Value;

/// Produces primary key values for tables whose key is generated by the
/// application rather than by the database.
///
/// One instance serves every task of the process, so implementations must be
/// stateless or synchronize internally.
pub trait KeyGenerator: Debug + Send + Sync {
    fn generate_key(&self) -> Value;
}

/// Default generator: random v4 UUIDs in 8-4-4-4-12 text form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl KeyGenerator for UuidGenerator {
    fn generate_key(&self) -> Value {
        Value::Text(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_keys_are_hyphenated_and_distinct() {
        let generator = UuidGenerator;
        let keys: HashSet<String> = (0..100)
            .map(|_| match generator.generate_key() {
                Value::Text(s) => s,
                other => panic!("unexpected key {:?}", other),
            })
            .collect();

        assert_eq!(keys.len(), 100);
        assert!(keys.iter().all(|k| k.len() == 36 && k.matches('-').count() == 4));
    }
}
