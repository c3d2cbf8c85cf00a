//! Application parameters on the wire are `[{"Key": .., "Value": ..}]` lists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValueParameter {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Parameter list sorted by key, whatever the map's iteration order.
pub fn to_parameter_list(params: &HashMap<String, String>) -> Vec<NameValueParameter> {
    let mut list: Vec<NameValueParameter> = params
        .iter()
        .map(|(key, value)| NameValueParameter {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    list.sort_by(|a, b| a.key.cmp(&b.key));
    list
}

pub fn parameter_list_to_map(list: &[NameValueParameter]) -> HashMap<String, String> {
    list.iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_by_key() {
        let params: HashMap<String, String> = [("zeta", "1"), ("Alpha", "2"), ("mid", "3"), ("beta", "4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let keys: Vec<String> = to_parameter_list(&params).into_iter().map(|p| p.key).collect();
        assert_eq!(keys, vec!["Alpha", "beta", "mid", "zeta"]);
    }

    #[test]
    fn test_map_round_trip() {
        let params: HashMap<String, String> = (0..20)
            .map(|i| (format!("Param{:02}", 19 - i), format!("value-{}", i)))
            .collect();
        let list = to_parameter_list(&params);
        assert_eq!(parameter_list_to_map(&list), params);
    }

    #[test]
    fn test_empty() {
        assert!(to_parameter_list(&HashMap::new()).is_empty());
        assert!(parameter_list_to_map(&[]).is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let list = vec![NameValueParameter {
            key: "InstanceCount".into(),
            value: "3".into(),
        }];
        assert_eq!(
            serde_json::to_string(&list).unwrap(),
            r#"[{"Key":"InstanceCount","Value":"3"}]"#
        );
    }
}
