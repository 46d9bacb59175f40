use crate::store::Value;
use indexmap::IndexMap;

/// Merge a user's capability meta with the site's role map.
///
/// Walking `user_caps` in order, a key naming a known role with a truthy
/// flag contributes that role's capabilities and is recorded as a role; any
/// other key is a direct grant. A later write to the same capability
/// overrides its value but keeps its original position.
#[must_use]
pub fn resolve(
    user_caps: &IndexMap<String, Value>,
    role_caps: &IndexMap<String, Value>,
) -> (IndexMap<String, bool>, Vec<String>) {
    let mut caps = IndexMap::new();
    let mut roles = Vec::new();

    for (key, flag) in user_caps {
        match role_caps.get(key).filter(|role| !role.is_null()) {
            Some(role) if flag.is_truthy() => {
                let granted = role
                    .get("capabilities")
                    .and_then(Value::to_map)
                    .unwrap_or_default();
                for (cap, value) in granted {
                    caps.insert(cap, value.is_truthy());
                }
                roles.push(key.clone());
            }
            _ => {
                caps.insert(key.clone(), flag.is_truthy());
            }
        }
    }

    (caps, roles)
}
