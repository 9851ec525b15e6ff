//! Translation of extracted names and addresses into the report language.

use crate::config::Config;
use crate::error::TranslationError;
use crate::models::ContactRecord;
use crate::patterns::clean_field;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Share of alphabetic characters that must be ASCII for text to be treated as English.
const ENGLISH_ASCII_THRESHOLD: f64 = 0.9;

/// Output of a translation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Translation {
    pub text: String,
    /// Language the backend detected for the input, when it reports one.
    pub source_language: Option<String>,
}

#[async_trait]
pub(crate) trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslationError>;
}

/// Identity translator used when translation is disabled.
pub(crate) struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslationError> {
        Ok(Translation {
            text: text.to_string(),
            source_language: Some(target.to_string()),
        })
    }
}

/// Client for Google's public web translation endpoint.
pub(crate) struct GoogleTranslator {
    client: Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub(crate) fn new(config: &Config) -> Result<Self, TranslationError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.translation_endpoint.clone(),
        })
    }
}

/// Parses `[[["translated","original",...],...],null,"de",...]`.
fn parse_google_response(body: &Value) -> Result<Translation, TranslationError> {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::Malformed("missing sentence list".to_string()))?;

    let text: String = sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        return Err(TranslationError::Malformed("empty translation".to_string()));
    }

    Ok(Translation {
        text,
        source_language: body.get(2).and_then(Value::as_str).map(str::to_string),
    })
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, TranslationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::Unavailable(format!("status {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslationError::Malformed(e.to_string()))?;
        parse_google_response(&body)
    }
}

/// True when nearly all letters in `text` are ASCII. Text without letters counts as English.
pub(crate) fn looks_english(text: &str) -> bool {
    let (ascii, total) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(ascii, total), c| {
            (ascii + usize::from(c.is_ascii()), total + 1)
        });
    total == 0 || ascii as f64 / total as f64 >= ENGLISH_ASCII_THRESHOLD
}

/// Translates one field. Returns the new text, or `None` when the original should stay.
async fn translate_field(
    value: &str,
    field: &str,
    translator: &dyn Translator,
    target: &str,
) -> Option<String> {
    if target.eq_ignore_ascii_case("en") && looks_english(value) {
        return None;
    }

    match translator.translate(value, target).await {
        Ok(translation) => {
            if translation
                .source_language
                .as_deref()
                .is_some_and(|lang| lang.eq_ignore_ascii_case(target))
            {
                tracing::debug!(target: "process_candidate_task",
                    "{} already in '{}': {}", field, target, value
                );
                return None;
            }
            let translated = clean_field(&translation.text)?;
            (translated != value).then_some(translated)
        }
        Err(e) => {
            tracing::warn!(target: "process_candidate_task",
                "Translation of {} '{}' failed, keeping original: {}", field, value, e
            );
            None
        }
    }
}

/// Translates the record's name and address in place. Never fails; a field that
/// cannot be translated keeps its original text and its flag stays false.
pub(crate) async fn localize_record(
    record: &mut ContactRecord,
    translator: &dyn Translator,
    target: &str,
) {
    if let Some(name) = record.company_name.clone() {
        if let Some(translated) = translate_field(&name, "name", translator, target).await {
            record.company_name = Some(translated);
            record.name_translated = true;
        }
    }
    if let Some(address) = record.address.clone() {
        if let Some(translated) = translate_field(&address, "address", translator, target).await {
            record.address = Some(translated);
            record.address_translated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _target: &str) -> Result<Translation, TranslationError> {
            Err(TranslationError::Unavailable("connection refused".to_string()))
        }
    }

    struct UppercaseTranslator;

    #[async_trait]
    impl Translator for UppercaseTranslator {
        async fn translate(&self, text: &str, _target: &str) -> Result<Translation, TranslationError> {
            Ok(Translation {
                text: text.to_uppercase(),
                source_language: Some("ru".to_string()),
            })
        }
    }

    fn record_with(name: &str, address: Option<&str>) -> ContactRecord {
        ContactRecord {
            company_name: Some(name.to_string()),
            address: address.map(str::to_string),
            ..ContactRecord::new("https://firma.ru/", "firma.ru")
        }
    }

    #[test]
    fn test_looks_english() {
        assert!(looks_english("Example Law Firm"));
        assert!(looks_english("1200 Market St."));
        assert!(looks_english(""));
        assert!(!looks_english("ООО Ромашка"));
        assert!(!looks_english("株式会社テスト"));
    }

    #[test]
    fn test_parse_google_response() {
        let body: Value = serde_json::from_str(
            r#"[[["Chamomile ","Ромашка ",null,null,1],["LLC","ООО",null,null,1]],null,"ru",null]"#,
        )
        .unwrap();
        let translation = parse_google_response(&body).unwrap();
        assert_eq!(translation.text, "Chamomile LLC");
        assert_eq!(translation.source_language.as_deref(), Some("ru"));

        let malformed: Value = serde_json::from_str(r#"{"error": "nope"}"#).unwrap();
        assert!(matches!(
            parse_google_response(&malformed),
            Err(TranslationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_translator_keeps_original() {
        let mut record = record_with("ООО Ромашка", Some("ул. Ленина 5, Москва"));
        localize_record(&mut record, &FailingTranslator, "en").await;
        assert_eq!(record.company_name.as_deref(), Some("ООО Ромашка"));
        assert!(!record.name_translated);
        assert_eq!(record.address.as_deref(), Some("ул. Ленина 5, Москва"));
        assert!(!record.address_translated);
    }

    #[tokio::test]
    async fn test_english_text_is_not_sent() {
        let mut record = record_with("Example Law Firm", None);
        localize_record(&mut record, &UppercaseTranslator, "en").await;
        assert_eq!(record.company_name.as_deref(), Some("Example Law Firm"));
        assert!(!record.name_translated);
    }

    #[tokio::test]
    async fn test_successful_translation_sets_flags() {
        let mut record = record_with("ооо ромашка", Some("ул. ленина 5"));
        localize_record(&mut record, &UppercaseTranslator, "en").await;
        assert_eq!(record.company_name.as_deref(), Some("ООО РОМАШКА"));
        assert!(record.name_translated);
        assert!(record.address_translated);
    }

    #[tokio::test]
    async fn test_noop_translator_changes_nothing() {
        let mut record = record_with("Café Müller GmbH Zürich Straße", None);
        localize_record(&mut record, &NoopTranslator, "de").await;
        assert_eq!(record.company_name.as_deref(), Some("Café Müller GmbH Zürich Straße"));
        assert!(!record.name_translated);
    }

    #[tokio::test]
    async fn test_google_translator_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/translate_a/single")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("client".into(), "gtx".into()),
                mockito::Matcher::UrlEncoded("tl".into(), "en".into()),
                mockito::Matcher::UrlEncoded("q".into(), "株式会社テスト".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[[["Test Co., Ltd.","株式会社テスト",null,null,10]],null,"ja"]"#)
            .create_async()
            .await;

        let config = Config {
            translation_endpoint: format!("{}/translate_a/single", server.url()),
            ..Config::default()
        };
        let translator = GoogleTranslator::new(&config).unwrap();
        let mut record = ContactRecord {
            company_name: Some("株式会社テスト".to_string()),
            ..ContactRecord::new("https://test.co.jp/", "test.co.jp")
        };
        localize_record(&mut record, &translator, "en").await;
        assert_eq!(record.company_name.as_deref(), Some("Test Co., Ltd."));
        assert!(record.name_translated);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_google_translator_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        let config = Config {
            translation_endpoint: server.url(),
            ..Config::default()
        };
        let translator = GoogleTranslator::new(&config).unwrap();
        let err = translator.translate("Ромашка", "en").await.unwrap_err();
        assert!(matches!(err, TranslationError::Unavailable(_)));
    }
}
