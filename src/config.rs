use crate::error::{Error, Result};
use crate::path::literal;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Replaced by the quoted [`FilterConfig::filter_name`] in every expression template.
pub const FILTER_PLACEHOLDER: &str = "{filter}";
/// Replaced by the quoted parameter name in [`FilterConfig::init_param_by_name_expr`].
pub const NAME_PLACEHOLDER: &str = "{name}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read filter config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid filter config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid filter config: {field} must contain {placeholder}")]
    MissingPlaceholder {
        field: &'static str,
        placeholder: &'static str,
    },
}

/// Names, path expressions and messages the editor works with.
///
/// The defaults describe the access control service filter. Every field has a default,
/// so a TOML file only needs the entries it overrides. The expressions are templates:
/// the filter name is filled in, so overriding `filter_name` alone retargets all of them.
///
/// ```
/// use webxml_filter::FilterConfig;
///
/// let config = FilterConfig::from_toml_str(r#"
/// filter_name = "AuthFilter"
/// filter_class = "com.example.AuthFilter"
/// "#).unwrap();
/// assert_eq!(config.url_pattern, "/*");
/// assert_eq!(
///     config.filter_selector().unwrap(),
///     "/web-app/filter[filter-name='AuthFilter']"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    // element names
    pub filter_tag: String,
    pub filter_name_tag: String,
    pub filter_class_tag: String,
    pub init_param_tag: String,
    pub param_name_tag: String,
    pub param_value_tag: String,
    pub filter_mapping_tag: String,
    pub url_pattern_tag: String,

    // literals written into new elements
    pub filter_name: String,
    pub filter_class: String,
    pub url_pattern: String,

    // expression templates, each containing FILTER_PLACEHOLDER
    /// Selects the filter block.
    pub filter_expr: String,
    /// Selects the filter-mapping block.
    pub filter_mapping_expr: String,
    /// Selects every init-param of the filter block.
    pub init_params_expr: String,
    /// Selects one init-param; also contains [`NAME_PLACEHOLDER`].
    pub init_param_by_name_expr: String,

    // messages; causes are appended to them
    pub parse_err_msg: String,
    pub file_missing_msg: String,
    pub param_set_err_msg: String,
    pub param_remove_err_msg: String,
    pub params_query_err_msg: String,
    pub remove_err_msg: String,
    pub save_err_msg: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_tag: "filter".to_string(),
            filter_name_tag: "filter-name".to_string(),
            filter_class_tag: "filter-class".to_string(),
            init_param_tag: "init-param".to_string(),
            param_name_tag: "param-name".to_string(),
            param_value_tag: "param-value".to_string(),
            filter_mapping_tag: "filter-mapping".to_string(),
            url_pattern_tag: "url-pattern".to_string(),

            filter_name: "ACSFilter".to_string(),
            filter_class: "com.microsoftopentechnologies.acs.federation.ACSFederationAuthFilter"
                .to_string(),
            url_pattern: "/*".to_string(),

            filter_expr: "/web-app/filter[filter-name={filter}]".to_string(),
            filter_mapping_expr: "/web-app/filter-mapping[filter-name={filter}]".to_string(),
            init_params_expr: "/web-app/filter[filter-name={filter}]/init-param".to_string(),
            init_param_by_name_expr:
                "/web-app/filter[filter-name={filter}]/init-param[param-name={name}]".to_string(),

            parse_err_msg: "Error occurred while parsing web.xml: ".to_string(),
            file_missing_msg: " file does not exist".to_string(),
            param_set_err_msg: "Error occurred while setting ACS filter parameter: ".to_string(),
            param_remove_err_msg: "Error occurred while removing ACS filter parameter: "
                .to_string(),
            params_query_err_msg: "Error occurred while reading ACS filter parameters: "
                .to_string(),
            remove_err_msg: "Error occurred while removing ACS filter settings: ".to_string(),
            save_err_msg: "Error occurred while saving web.xml: ".to_string(),
        }
    }
}

impl FilterConfig {
    /// # Errors
    ///
    /// - [`ConfigError::MissingPlaceholder`]: An expression template would not depend on
    /// the filter name or the parameter name.
    pub fn from_toml_str(s: &str) -> std::result::Result<FilterConfig, ConfigError> {
        let config: FilterConfig = toml::from_str(s)?;
        config.check_templates()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<FilterConfig, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    fn check_templates(&self) -> std::result::Result<(), ConfigError> {
        let templates = [
            ("filter_expr", &self.filter_expr, FILTER_PLACEHOLDER),
            ("filter_mapping_expr", &self.filter_mapping_expr, FILTER_PLACEHOLDER),
            ("init_params_expr", &self.init_params_expr, FILTER_PLACEHOLDER),
            ("init_param_by_name_expr", &self.init_param_by_name_expr, FILTER_PLACEHOLDER),
            ("init_param_by_name_expr", &self.init_param_by_name_expr, NAME_PLACEHOLDER),
        ];
        for &(field, template, placeholder) in templates.iter() {
            if !template.contains(placeholder) {
                return Err(ConfigError::MissingPlaceholder {
                    field,
                    placeholder,
                });
            }
        }
        Ok(())
    }

    fn fill(&self, template: &str, name: Option<&str>) -> Result<String> {
        let filter = quote("filter", &self.filter_name)?;
        let mut pairs = vec![(FILTER_PLACEHOLDER, filter)];
        if let Some(name) = name {
            pairs.push((NAME_PLACEHOLDER, quote("parameter", name)?));
        }
        Ok(substitute(template, &pairs))
    }

    /// Expression selecting the filter block.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedPath`]: The filter name contains both quote characters.
    pub fn filter_selector(&self) -> Result<String> {
        self.fill(&self.filter_expr, None)
    }

    pub fn filter_mapping_selector(&self) -> Result<String> {
        self.fill(&self.filter_mapping_expr, None)
    }

    pub fn init_params_selector(&self) -> Result<String> {
        self.fill(&self.init_params_expr, None)
    }

    /// Expression selecting the init-param called `name`.
    pub fn init_param_selector(&self, name: &str) -> Result<String> {
        self.fill(&self.init_param_by_name_expr, Some(name))
    }

    /// Relative expression for the param-value child of an init-param.
    pub fn param_value_expr(&self) -> String {
        format!("./{}", self.param_value_tag)
    }

    pub fn param_name_text_expr(&self) -> String {
        format!("./{}/text()", self.param_name_tag)
    }

    pub fn param_value_text_expr(&self) -> String {
        format!("./{}/text()", self.param_value_tag)
    }
}

// One pass, so substituted values are never searched for placeholders.
fn substitute(template: &str, pairs: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while let Some(c) = rest.chars().next() {
        for (placeholder, value) in pairs {
            if let Some(tail) = rest.strip_prefix(placeholder) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn quote(kind: &str, value: &str) -> Result<String> {
    literal(value).ok_or_else(|| {
        Error::MalformedPath(format!(
            "{} name {} contains both quote characters",
            kind, value
        ))
    })
}
