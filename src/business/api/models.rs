//! Wire types of the panel's mu API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::business::api::UserId;
use crate::error::{PanelError, Result};
use crate::logger::log;

/// Panels send `null` for unset fields; treat it like a missing one
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response envelope: `{ "ret": 1, "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ret: i64,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Request envelope for every report
#[derive(Debug, Clone, Serialize)]
pub struct PostData<T> {
    pub data: T,
}

/// Node info payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfoResponse {
    #[serde(default, deserialize_with = "null_as_default", rename = "node_group")]
    pub group: i64,
    #[serde(default, deserialize_with = "null_as_default", rename = "node_class")]
    pub class: i64,
    #[serde(default, deserialize_with = "null_as_default", rename = "node_speedlimit")]
    pub speed_limit: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub traffic_rate: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sort: i64,
    #[serde(default, deserialize_with = "null_as_default", rename = "server")]
    pub raw_server: String,
    #[serde(default, deserialize_with = "null_as_default", rename = "type")]
    pub node_type: String,
    /// Provider-specific blob; parsed by the resolver
    #[serde(default)]
    pub custom_config: Option<serde_json::Value>,
    /// Panel version, used to gate status reports
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
}

/// `custom_config` blob of a node
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomConfig {
    /// Listening port; panels send it as a string or a number
    #[serde(default)]
    pub offset_port_node: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub network: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub security: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default)]
    pub header: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub servicename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flow: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_vless: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enable_reality: bool,
    #[serde(default, rename = "reality-opts")]
    pub reality_opts: Option<RealityOpts>,
    #[serde(default, deserialize_with = "null_as_default", rename = "route_dns")]
    pub route_dns: Vec<String>,
}

/// REALITY options inside `custom_config`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealityOpts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dest: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_protocol_ver: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_names: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub private_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_client_ver: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_client_ver: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_time_diff: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub short_ids: Vec<String>,
}

/// One row of the user list
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub passwd: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub port: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    /// Mbps
    #[serde(default, deserialize_with = "null_as_default", rename = "node_speedlimit")]
    pub speed_limit: f64,
    #[serde(default, deserialize_with = "null_as_default", rename = "node_iplimit")]
    pub device_limit: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alive_ip: i64,
}

/// One row of the detect rule list
#[derive(Debug, Clone, Deserialize)]
pub struct RuleItem {
    pub id: i64,
    pub content: String,
}

/// (user, ip) pair for the alive-ip report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnlineUser {
    #[serde(rename = "user_id")]
    pub uid: UserId,
    pub ip: String,
}

/// Per-user traffic delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTraffic {
    #[serde(rename = "user_id")]
    pub uid: UserId,
    #[serde(rename = "u")]
    pub upload: u64,
    #[serde(rename = "d")]
    pub download: u64,
}

/// A detect rule hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllegalItem {
    #[serde(rename = "list_id")]
    pub rule_id: i64,
    #[serde(rename = "user_id")]
    pub uid: UserId,
}

/// Status body for older panels
#[derive(Debug, Clone, Serialize)]
pub struct SystemLoad {
    pub uptime: String,
    pub load: String,
}

/// Decode a JSON array row by row, skipping rows that do not fit `T`.
///
/// `null` is an empty list; anything else that is not an array fails as a whole.
pub fn decode_rows<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<Vec<T>> {
    let rows = match data {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            return Err(PanelError::Decode(format!(
                "{} data is not a list: {}",
                kind, other
            )))
        }
    };

    Ok(rows
        .into_iter()
        .filter_map(|row| match T::deserialize(&row) {
            Ok(item) => Some(item),
            Err(e) => {
                log::skipped_record(kind, &row.to_string(), &e.to_string());
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rows_skips_malformed() {
        let data = serde_json::json!([
            {"id": 1, "content": "a"},
            {"content": "missing id"},
            {"id": 3, "content": "c"}
        ]);
        let rules: Vec<RuleItem> = decode_rows("rules", data).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[1].id, 3);
    }

    #[test]
    fn test_decode_rows_null_is_empty() {
        let rules: Vec<RuleItem> = decode_rows("rules", serde_json::Value::Null).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_decode_rows_rejects_non_list() {
        let result: Result<Vec<RuleItem>> = decode_rows("rules", serde_json::json!({"id": 1}));
        assert!(matches!(result, Err(PanelError::Decode(_))));
    }

    #[test]
    fn test_envelope_without_data() {
        let env: Envelope = serde_json::from_str(r#"{"ret":1}"#).unwrap();
        assert_eq!(env.ret, 1);
        assert!(env.data.is_null());
    }

    #[test]
    fn test_user_response_field_names() {
        let user: UserResponse = serde_json::from_str(
            r#"{"id":5,"passwd":"p","port":0,"method":"aes-128-gcm","node_speedlimit":8.0,
                "node_iplimit":3,"uuid":"u-5","alive_ip":2}"#,
        )
        .unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.device_limit, 3);
        assert_eq!(user.alive_ip, 2);
        assert_eq!(user.speed_limit, 8.0);
    }

    #[test]
    fn test_user_response_null_fields_default() {
        let user: UserResponse = serde_json::from_str(
            r#"{"id":9,"passwd":null,"port":null,"method":null,"node_speedlimit":null,
                "node_iplimit":null,"uuid":null,"alive_ip":null}"#,
        )
        .unwrap();
        assert_eq!(user.id, 9);
        assert_eq!(user.method, "");
        assert_eq!(user.uuid, "");
        assert_eq!(user.device_limit, 0);
        assert_eq!(user.speed_limit, 0.0);
    }

    #[test]
    fn test_node_info_null_version() {
        let info: NodeInfoResponse =
            serde_json::from_str(r#"{"node_speedlimit":null,"version":null,"sort":14}"#).unwrap();
        assert_eq!(info.version, "");
        assert_eq!(info.speed_limit, 0.0);
        assert_eq!(info.sort, 14);
    }

    #[test]
    fn test_report_items_wire_names() {
        let online = serde_json::to_value(OnlineUser { uid: 1, ip: "1.1.1.1".into() }).unwrap();
        assert_eq!(online, serde_json::json!({"user_id": 1, "ip": "1.1.1.1"}));

        let traffic = serde_json::to_value(UserTraffic { uid: 2, upload: 10, download: 20 }).unwrap();
        assert_eq!(traffic, serde_json::json!({"user_id": 2, "u": 10, "d": 20}));

        let illegal = serde_json::to_value(IllegalItem { rule_id: 7, uid: 3 }).unwrap();
        assert_eq!(illegal, serde_json::json!({"list_id": 7, "user_id": 3}));
    }

    #[test]
    fn test_custom_config_reality_key() {
        let cfg: CustomConfig = serde_json::from_str(
            r#"{"offset_port_node":"443","reality-opts":{"dest":"a.com:443","short_ids":["01"]}}"#,
        )
        .unwrap();
        let reality = cfg.reality_opts.unwrap();
        assert_eq!(reality.dest, "a.com:443");
        assert_eq!(reality.short_ids, vec!["01".to_string()]);
    }
}
