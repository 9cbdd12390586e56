//! Per-session metadata derived from the container description.
//!
//! The tag comes from the `tag` log option, a template over container
//! fields such as `{{.Name}}/{{.ID}}`. Extra attributes copy selected labels
//! and environment variables into every record.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use thiserror::Error;

use fluentd_async_types::LoggerInfo;

/// Log option holding the tag template.
pub const TAG_KEY: &str = "tag";
/// Template used when no tag is configured.
pub const DEFAULT_TAG_TEMPLATE: &str = "{{.ID}}";
/// Comma-separated label keys to copy.
pub const LABELS_KEY: &str = "labels";
/// Pattern selecting label keys to copy.
pub const LABELS_REGEX_KEY: &str = "labels-regex";
/// Comma-separated environment variable names to copy.
pub const ENV_KEY: &str = "env";
/// Pattern selecting environment variable names to copy.
pub const ENV_REGEX_KEY: &str = "env-regex";

/// Errors raised while deriving session metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The tag template could not be rendered.
    #[error("invalid tag template '{template}': {reason}")]
    InvalidTag { template: String, reason: String },

    /// A selection pattern failed to compile.
    #[error("invalid {option} pattern: {source}")]
    InvalidPattern {
        option: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Identity and enrichment attached to every record of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Rendered tag, computed once per session.
    pub tag: String,
    /// Full container identifier.
    pub container_id: String,
    /// Container name as reported by the engine.
    pub container_name: String,
    /// Labels and environment variables selected by the log options.
    pub extra: BTreeMap<String, String>,
}

impl SessionMetadata {
    /// Derives tag and extra attributes from `info`.
    pub fn from_info(info: &LoggerInfo) -> Result<Self, MetadataError> {
        let template = info.option(TAG_KEY).unwrap_or(DEFAULT_TAG_TEMPLATE);
        Ok(Self {
            tag: render_tag(template, info)?,
            container_id: info.container_id.clone(),
            container_name: info.container_name.clone(),
            extra: extra_attributes(info)?,
        })
    }
}

/// Renders a tag template.
///
/// Only field actions (`{{.Field}}`) are supported; anything else is an error.
pub fn render_tag(template: &str, info: &LoggerInfo) -> Result<String, MetadataError> {
    let invalid = |reason: String| MetadataError::InvalidTag {
        template: template.to_owned(),
        reason,
    };

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((text, after_open)) = rest.split_once("{{") {
        rendered.push_str(text);
        let Some((action, after_close)) = after_open.split_once("}}") else {
            return Err(invalid(String::from("unterminated action")));
        };
        let field = action
            .trim()
            .strip_prefix('.')
            .ok_or_else(|| invalid(format!("unsupported action '{}'", action.trim())))?;
        rendered.push_str(&field_value(field, info).ok_or_else(|| {
            invalid(format!("unknown field '{field}'"))
        })?);
        rest = after_close;
    }
    rendered.push_str(rest);
    Ok(rendered)
}

fn field_value(field: &str, info: &LoggerInfo) -> Option<String> {
    let value = match field {
        "ID" => info.id(),
        "FullID" => info.full_id().to_owned(),
        "Name" => info.name().to_owned(),
        "ImageID" => info.image_id(),
        "ImageFullID" => info.image_full_id().to_owned(),
        "ImageName" => info.image_name().to_owned(),
        "DaemonName" => info.daemon_name.clone(),
        "Command" => info.command(),
        _ => return None,
    };
    Some(value)
}

/// Collects the labels and environment variables selected by the log options.
pub fn extra_attributes(info: &LoggerInfo) -> Result<BTreeMap<String, String>, MetadataError> {
    let mut extra = BTreeMap::new();

    if let Some(keys) = info.option(LABELS_KEY) {
        copy_listed(keys, &info.container_labels, &mut extra);
    }
    if let Some(pattern) = info.option(LABELS_REGEX_KEY) {
        copy_matching(LABELS_REGEX_KEY, pattern, &info.container_labels, &mut extra)?;
    }

    let environment: HashMap<String, String> = info
        .container_env
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect();
    if let Some(names) = info.option(ENV_KEY) {
        copy_listed(names, &environment, &mut extra);
    }
    if let Some(pattern) = info.option(ENV_REGEX_KEY) {
        copy_matching(ENV_REGEX_KEY, pattern, &environment, &mut extra)?;
    }

    Ok(extra)
}

fn copy_listed(
    keys: &str,
    source: &HashMap<String, String>,
    extra: &mut BTreeMap<String, String>,
) {
    for key in keys.split(',') {
        if let Some(value) = source.get(key) {
            extra.insert(key.to_owned(), value.clone());
        }
    }
}

fn copy_matching(
    option: &'static str,
    pattern: &str,
    source: &HashMap<String, String>,
    extra: &mut BTreeMap<String, String>,
) -> Result<(), MetadataError> {
    let matcher =
        Regex::new(pattern).map_err(|source| MetadataError::InvalidPattern { option, source })?;
    for (key, value) in source {
        if matcher.is_match(key) {
            extra.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn info() -> LoggerInfo {
        LoggerInfo {
            container_id: String::from("0123456789abcdef"),
            container_name: String::from("/web"),
            container_image_id: String::from("sha256:aaaabbbbccccdddd"),
            container_image_name: String::from("nginx:1.27"),
            daemon_name: String::from("docker"),
            container_entrypoint: String::from("nginx"),
            container_args: vec![String::from("-g"), String::from("daemon off;")],
            container_env: vec![
                String::from("STAGE=prod"),
                String::from("REGION=eu-west-1"),
                String::from("SECRET=hunter2"),
                String::from("MALFORMED"),
            ],
            container_labels: HashMap::from([
                (String::from("team"), String::from("payments")),
                (String::from("com.example.tier"), String::from("backend")),
            ]),
            ..LoggerInfo::default()
        }
    }

    fn with_options(mut info: LoggerInfo, options: &[(&str, &str)]) -> LoggerInfo {
        for (key, value) in options {
            info.config.insert((*key).to_owned(), (*value).to_owned());
        }
        info
    }

    #[rstest]
    fn default_tag_is_the_short_container_id(info: LoggerInfo) {
        let metadata = SessionMetadata::from_info(&info).expect("metadata");
        assert_eq!(metadata.tag, "0123456789ab");
        assert_eq!(metadata.container_name, "/web");
        assert!(metadata.extra.is_empty());
    }

    #[rstest]
    #[case("docker.{{.Name}}", "docker.web")]
    #[case("{{ .ImageName }}/{{.ImageID}}", "nginx:1.27/aaaabbbbcccc")]
    #[case("{{.DaemonName}}:{{.FullID}}", "docker:0123456789abcdef")]
    #[case("{{.Command}}", "nginx -g daemon off;")]
    #[case("static", "static")]
    fn renders_tag_templates(info: LoggerInfo, #[case] template: &str, #[case] expected: &str) {
        assert_eq!(render_tag(template, &info).expect("render"), expected);
    }

    #[rstest]
    #[case("{{.Nope}}")]
    #[case("{{.Name")]
    #[case("{{upper .Name}}")]
    fn rejects_unsupported_templates(info: LoggerInfo, #[case] template: &str) {
        let error = SessionMetadata::from_info(&with_options(info, &[(TAG_KEY, template)]))
            .expect_err("template is invalid");
        assert!(matches!(error, MetadataError::InvalidTag { .. }));
    }

    #[rstest]
    fn copies_listed_labels_and_variables(info: LoggerInfo) {
        let info = with_options(info, &[(LABELS_KEY, "team,missing"), (ENV_KEY, "STAGE")]);
        let extra = extra_attributes(&info).expect("extras");
        assert_eq!(
            extra,
            BTreeMap::from([
                (String::from("STAGE"), String::from("prod")),
                (String::from("team"), String::from("payments")),
            ])
        );
    }

    #[rstest]
    fn copies_keys_matching_patterns(info: LoggerInfo) {
        let info = with_options(info, &[(LABELS_REGEX_KEY, r"^com\.example\."), (ENV_REGEX_KEY, "^(STAGE|REGION)$")]);
        let extra = extra_attributes(&info).expect("extras");
        assert_eq!(extra.get("com.example.tier").map(String::as_str), Some("backend"));
        assert_eq!(extra.get("REGION").map(String::as_str), Some("eu-west-1"));
        assert!(!extra.contains_key("SECRET"));
        assert!(!extra.contains_key("team"));
    }

    #[rstest]
    fn invalid_pattern_is_reported(info: LoggerInfo) {
        let error = extra_attributes(&with_options(info, &[(ENV_REGEX_KEY, "(")]))
            .expect_err("pattern is invalid");
        assert!(matches!(
            error,
            MetadataError::InvalidPattern {
                option: ENV_REGEX_KEY,
                ..
            }
        ));
    }
}
