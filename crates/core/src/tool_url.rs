//! Tool gateway URL construction
//!
//! The hosted MCP gateway takes its per-user configuration as a base64 JSON
//! blob in the query string, next to the gateway key and profile. The JSON is
//! written with `", "` and `": "` separators and ASCII-only escapes, which is
//! the form the gateway's existing clients send.

use std::fmt;
use std::io;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

use crate::config::GatewaySettings;
use crate::error::Error;
use crate::model::LeetCodeSite;
use crate::Result;

/// JSON formatter with spaced separators and `\uXXXX` escapes for non-ASCII
#[derive(Debug, Default, Clone, Copy)]
pub struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize a value the way the gateway expects its config payload
pub fn to_gateway_json<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let mut out = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    value.serialize(&mut serializer)?;
    // The formatter only ever writes ASCII.
    String::from_utf8(out).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Base64 of the gateway JSON form of `config`
pub fn encode_config<T>(config: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    Ok(STANDARD.encode(to_gateway_json(config)?))
}

/// Reverse of [`encode_config`]
pub fn decode_config(encoded: &str) -> Result<serde_json::Value> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidInput(format!("Invalid base64 config: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Build a gateway URL: `base?config=<b64 json>&api_key=<key>&profile=<profile>`
///
/// `api_key` and `profile` are inserted verbatim.
pub fn smithery_url<T>(base_url: &str, config: &T, api_key: &str, profile: &str) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let config_b64 = encode_config(config)?;
    Ok(format!(
        "{}?config={}&api_key={}&profile={}",
        base_url, config_b64, api_key, profile
    ))
}

/// LeetCode proxy configuration
#[derive(Debug, Clone, Serialize)]
pub struct LeetCodeToolConfig<'a> {
    pub site: LeetCodeSite,
    pub session: &'a str,
}

/// GitHub proxy configuration
#[derive(Clone, Serialize)]
pub struct GitHubToolConfig<'a> {
    #[serde(rename = "githubPersonalAccessToken")]
    pub github_personal_access_token: &'a str,
}

/// A remote tool provider the agent connects to
#[derive(Clone, PartialEq, Eq)]
pub struct ToolEndpoint {
    pub name: String,
    pub url: String,
}

impl ToolEndpoint {
    pub const LEETCODE: &'static str = "leetcode";
    pub const GITHUB: &'static str = "github";

    /// Keys of the embedded config, without their values
    pub fn config_keys(&self) -> Result<Vec<String>> {
        let encoded = query_param(&self.url, "config")
            .ok_or_else(|| Error::InvalidInput(format!("{} URL has no config", self.name)))?;
        Ok(match decode_config(encoded)? {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }
}

/// The URL carries credentials, so only the name and host are shown.
impl fmt::Debug for ToolEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("ToolEndpoint")
            .field("name", &self.name)
            .field("url", &format_args!("{}?<redacted>", base))
            .finish()
    }
}

impl GatewaySettings {
    fn credentials(&self) -> Result<(&str, &str)> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(Error::MissingSetting("SMITHERY_API_KEY"))?;
        let profile = self
            .profile
            .as_deref()
            .ok_or(Error::MissingSetting("SMITHERY_PROFILE"))?;
        Ok((api_key, profile))
    }

    pub fn leetcode_endpoint(&self, site: LeetCodeSite, session: &str) -> Result<ToolEndpoint> {
        let (api_key, profile) = self.credentials()?;
        let url = smithery_url(
            &self.leetcode_base_url,
            &LeetCodeToolConfig { site, session },
            api_key,
            profile,
        )?;
        Ok(ToolEndpoint {
            name: ToolEndpoint::LEETCODE.to_string(),
            url,
        })
    }

    pub fn github_endpoint(&self, token: &str) -> Result<ToolEndpoint> {
        let (api_key, profile) = self.credentials()?;
        let url = smithery_url(
            &self.github_base_url,
            &GitHubToolConfig {
                github_personal_access_token: token,
            },
            api_key,
            profile,
        )?;
        Ok(ToolEndpoint {
            name: ToolEndpoint::GITHUB.to_string(),
            url,
        })
    }
}

/// Pull one raw query parameter out of a URL without decoding it
pub fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn gateway() -> GatewaySettings {
        GatewaySettings {
            api_key: Some("K".to_string()),
            profile: Some("P".to_string()),
            leetcode_base_url: "https://lc.example/mcp".to_string(),
            github_base_url: "https://gh.example/mcp".to_string(),
        }
    }

    #[test]
    fn builds_url_with_spaced_json_config() {
        let config = LeetCodeToolConfig {
            site: LeetCodeSite::Global,
            session: "abc",
        };
        let url = smithery_url("https://x/mcp", &config, "K", "P").unwrap();
        let expected_b64 = STANDARD.encode(r#"{"site": "global", "session": "abc"}"#);
        assert_eq!(
            url,
            format!("https://x/mcp?config={}&api_key=K&profile=P", expected_b64)
        );
    }

    #[test]
    fn config_round_trips_through_the_url() {
        let config = json!({
            "githubPersonalAccessToken": "ghp_123",
            "nested": {"list": [1, 2, "three"], "flag": true, "none": null}
        });
        let url = smithery_url("https://gh/mcp", &config, "key", "profile").unwrap();
        let encoded = query_param(&url, "config").unwrap();
        assert_eq!(decode_config(encoded).unwrap(), config);
        assert_eq!(query_param(&url, "api_key"), Some("key"));
        assert_eq!(query_param(&url, "profile"), Some("profile"));
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<String>().prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(any::<String>(), inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn any_config_survives_the_url(
            config in json_value(),
            base in "https://[a-z]{1,8}\\.example/[a-z/]{0,8}",
            key in "[A-Za-z0-9_-]{1,16}",
            profile in "[A-Za-z0-9_-]{1,16}",
        ) {
            let url = smithery_url(&base, &config, &key, &profile).unwrap();
            prop_assert!(url.is_ascii());
            let encoded = query_param(&url, "config").unwrap();
            prop_assert_eq!(decode_config(encoded).unwrap(), config);
            prop_assert_eq!(query_param(&url, "api_key"), Some(key.as_str()));
            prop_assert_eq!(query_param(&url, "profile"), Some(profile.as_str()));
        }
    }

    #[test]
    fn non_ascii_is_escaped() {
        let json = to_gateway_json(&json!({"name": "désolé 🚀"})).unwrap();
        assert_eq!(json, r#"{"name": "d\u00e9sol\u00e9 \ud83d\ude80"}"#);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&json).unwrap()["name"],
            "désolé 🚀"
        );
    }

    #[test]
    fn arrays_use_spaced_separators() {
        assert_eq!(to_gateway_json(&json!([1, "a", []])).unwrap(), r#"[1, "a", []]"#);
    }

    #[test]
    fn credentials_are_not_escaped() {
        let url = smithery_url("https://x/mcp", &json!({}), "a&b", "c=d").unwrap();
        assert!(url.ends_with("&api_key=a&b&profile=c=d"));
    }

    #[test]
    fn endpoints_embed_per_user_credentials() {
        let gateway = gateway();
        let lc = gateway.leetcode_endpoint(LeetCodeSite::Cn, "sess").unwrap();
        assert_eq!(lc.name, ToolEndpoint::LEETCODE);
        assert!(lc.url.starts_with("https://lc.example/mcp?config="));
        let decoded = decode_config(query_param(&lc.url, "config").unwrap()).unwrap();
        assert_eq!(decoded, json!({"site": "cn", "session": "sess"}));

        let gh = gateway.github_endpoint("ghp_x").unwrap();
        let decoded = decode_config(query_param(&gh.url, "config").unwrap()).unwrap();
        assert_eq!(decoded, json!({"githubPersonalAccessToken": "ghp_x"}));
    }

    #[test]
    fn config_keys_hide_values() {
        let endpoint = gateway().leetcode_endpoint(LeetCodeSite::Global, "sess").unwrap();
        let mut keys = endpoint.config_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session", "site"]);

        let bare = ToolEndpoint {
            name: "bare".to_string(),
            url: "https://x/mcp".to_string(),
        };
        assert!(bare.config_keys().is_err());
    }

    #[test]
    fn missing_gateway_key_is_a_configuration_error() {
        let mut gateway = gateway();
        gateway.api_key = None;
        let err = gateway.github_endpoint("t").unwrap_err();
        assert!(matches!(err, Error::MissingSetting("SMITHERY_API_KEY")));
    }

    #[test]
    fn debug_output_hides_query_string() {
        let endpoint = gateway().github_endpoint("ghp_secret").unwrap();
        let rendered = format!("{:?}", endpoint);
        assert!(rendered.contains("https://gh.example/mcp"));
        assert!(!rendered.contains("api_key"));
        assert!(!rendered.contains(&encode_config(&json!({"githubPersonalAccessToken": "ghp_secret"})).unwrap()));
    }
}
