use crate::config::FilterConfig;
use crate::document::Document;
use crate::element::Element;
use crate::error::Error;
use crate::path::PathExpr;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors returned by [`FilterDescriptorEditor`].
///
/// Except for `DescriptorNotFound` and `InvalidArgument`, the message comes from
/// [`FilterConfig`] and the cause is kept as the error source.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("{}{}", .path.display(), .message)]
    DescriptorNotFound { path: PathBuf, message: String },
    #[error("{message}{source}")]
    DescriptorParse {
        message: String,
        #[source]
        source: Error,
    },
    #[error("filter parameter {0} must not be empty")]
    InvalidArgument(&'static str),
    #[error("{message}{source}")]
    ParamSet {
        message: String,
        #[source]
        source: Error,
    },
    #[error("{message}{source}")]
    ParamRemove {
        message: String,
        #[source]
        source: Error,
    },
    #[error("{message}{source}")]
    ParamsQuery {
        message: String,
        #[source]
        source: Error,
    },
    #[error("{message}{source}")]
    RemoveAll {
        message: String,
        #[source]
        source: Error,
    },
    #[error("{message}{source}")]
    Persist {
        message: String,
        #[source]
        source: Error,
    },
}

pub type EditorResult<T> = std::result::Result<T, EditorError>;

/// Edits one filter block, its filter-mapping and its init-params in a `web.xml`.
///
/// Changes stay in memory until [`save`](FilterDescriptorEditor::save) is called.
///
/// ```no_run
/// use webxml_filter::FilterDescriptorEditor;
///
/// let mut editor = FilterDescriptorEditor::open("WebContent/WEB-INF/web.xml")?;
/// editor.set_param("realm", "http://localhost:8080/")?;
/// editor.remove_param("certificate")?;
/// editor.save()?;
/// # Ok::<(), webxml_filter::EditorError>(())
/// ```
#[derive(Debug)]
pub struct FilterDescriptorEditor {
    path: PathBuf,
    document: Document,
    config: FilterConfig,
}

impl FilterDescriptorEditor {
    /// Parse the descriptor at `path` using the default filter configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> EditorResult<FilterDescriptorEditor> {
        Self::open_with_config(path, FilterConfig::default())
    }

    /// # Errors
    ///
    /// - [`EditorError::DescriptorNotFound`]: There is no file at `path`.
    /// - [`EditorError::DescriptorParse`]: The file could not be read, decoded or parsed.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: FilterConfig,
    ) -> EditorResult<FilterDescriptorEditor> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            tracing::error!(path = %path.display(), "descriptor does not exist");
            return Err(EditorError::DescriptorNotFound {
                path,
                message: config.file_missing_msg,
            });
        }
        let document = match Document::parse_file(&path) {
            Ok(document) => document,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "cannot parse descriptor");
                return Err(EditorError::DescriptorParse {
                    message: config.parse_err_msg,
                    source: err,
                });
            }
        };
        tracing::debug!(path = %path.display(), "descriptor loaded");
        Ok(FilterDescriptorEditor {
            path,
            document,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// The in-memory descriptor, including unsaved changes.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Add the init-param `name`, or overwrite its value if it already exists.
    ///
    /// Creates the filter block and the filter-mapping block first if they are missing.
    /// A failure to create the mapping is logged and otherwise ignored.
    /// On error the document may be left partially modified.
    pub fn set_param(&mut self, name: &str, value: &str) -> EditorResult<()> {
        if name.is_empty() {
            return Err(EditorError::InvalidArgument("name"));
        }
        if value.is_empty() {
            return Err(EditorError::InvalidArgument("value"));
        }
        self.try_set_param(name, value).map_err(|err| {
            tracing::error!(name, error = %err, "cannot set filter parameter");
            EditorError::ParamSet {
                message: self.config.param_set_err_msg.clone(),
                source: err,
            }
        })
    }

    /// Remove the init-param `name`. Does nothing if there is none.
    pub fn remove_param(&mut self, name: &str) -> EditorResult<()> {
        if name.is_empty() {
            return Err(EditorError::InvalidArgument("name"));
        }
        self.try_remove_param(name).map_err(|err| {
            tracing::error!(name, error = %err, "cannot remove filter parameter");
            EditorError::ParamRemove {
                message: self.config.param_remove_err_msg.clone(),
                source: err,
            }
        })
    }

    /// All init-params of the filter block by name. Empty if there is no filter block.
    ///
    /// If the descriptor repeats a name, the value of the last occurrence wins.
    pub fn params(&self) -> EditorResult<HashMap<String, String>> {
        self.try_params().map_err(|err| {
            tracing::error!(error = %err, "cannot read filter parameters");
            EditorError::ParamsQuery {
                message: self.config.params_query_err_msg.clone(),
                source: err,
            }
        })
    }

    /// Remove the filter block and the filter-mapping block, whichever exist.
    pub fn remove_all(&mut self) -> EditorResult<()> {
        self.try_remove_all().map_err(|err| {
            tracing::error!(error = %err, "cannot remove filter settings");
            EditorError::RemoveAll {
                message: self.config.remove_err_msg.clone(),
                source: err,
            }
        })
    }

    /// Overwrite the descriptor file with the in-memory document.
    pub fn save(&self) -> EditorResult<()> {
        match self.document.write_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "descriptor saved");
                Ok(())
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), error = %err, "cannot save descriptor");
                Err(EditorError::Persist {
                    message: self.config.save_err_msg.clone(),
                    source: err,
                })
            }
        }
    }
}

impl FilterDescriptorEditor {
    fn select_first(&self, expr: &str) -> Result<Option<Element>, Error> {
        let expr = PathExpr::compile(expr)?;
        Ok(expr.select_first(&self.document, self.document.container()))
    }

    fn filter(&self) -> Result<Option<Element>, Error> {
        self.select_first(&self.config.filter_selector()?)
    }

    fn filter_mapping(&self) -> Result<Option<Element>, Error> {
        self.select_first(&self.config.filter_mapping_selector()?)
    }

    fn param(&self, name: &str) -> Result<Option<Element>, Error> {
        self.select_first(&self.config.init_param_selector(name)?)
    }

    fn root(&self) -> Result<Element, Error> {
        self.document.root_element().ok_or(Error::NoRootElement)
    }

    fn create_filter(&mut self) -> Result<Element, Error> {
        let root = self.root()?;
        let config = &self.config;
        let doc = &mut self.document;
        let filter = Element::build(&config.filter_tag).push_to(doc, root);
        Element::build(&config.filter_name_tag)
            .text_content(&config.filter_name)
            .push_to(doc, filter);
        Element::build(&config.filter_class_tag)
            .text_content(&config.filter_class)
            .push_to(doc, filter);
        tracing::debug!(filter = %config.filter_name, "added filter block");
        Ok(filter)
    }

    // Failures here must not stop the parameter from being stored.
    fn ensure_filter_mapping(&mut self) {
        if let Err(err) = self.try_ensure_filter_mapping() {
            tracing::warn!(error = %err, "cannot add filter mapping");
        }
    }

    fn try_ensure_filter_mapping(&mut self) -> Result<(), Error> {
        if self.filter_mapping()?.is_some() {
            return Ok(());
        }
        let root = self.root()?;
        let config = &self.config;
        let doc = &mut self.document;
        let mapping = Element::build(&config.filter_mapping_tag).push_to(doc, root);
        Element::build(&config.filter_name_tag)
            .text_content(&config.filter_name)
            .push_to(doc, mapping);
        Element::build(&config.url_pattern_tag)
            .text_content(&config.url_pattern)
            .push_to(doc, mapping);
        tracing::debug!(filter = %config.filter_name, "added filter-mapping block");
        Ok(())
    }

    fn try_set_param(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let filter = match self.filter()? {
            Some(filter) => filter,
            None => self.create_filter()?,
        };
        self.ensure_filter_mapping();

        match self.param(name)? {
            Some(param) => {
                let value_expr = PathExpr::compile(&self.config.param_value_expr())?;
                let value_elem = value_expr
                    .select_first(&self.document, param)
                    .ok_or_else(|| Error::MissingElement(self.config.param_value_tag.clone()))?;
                value_elem.set_text_content(&mut self.document, value);
            }
            None => {
                let config = &self.config;
                let doc = &mut self.document;
                let param = Element::build(&config.init_param_tag).push_to(doc, filter);
                Element::build(&config.param_name_tag)
                    .text_content(name)
                    .push_to(doc, param);
                Element::build(&config.param_value_tag)
                    .text_content(value)
                    .push_to(doc, param);
            }
        }
        Ok(())
    }

    fn try_remove_param(&mut self, name: &str) -> Result<(), Error> {
        if let Some(param) = self.param(name)? {
            param.detach(&mut self.document)?;
        }
        Ok(())
    }

    fn try_params(&self) -> Result<HashMap<String, String>, Error> {
        let doc = &self.document;
        let params_expr = PathExpr::compile(&self.config.init_params_selector()?)?;
        let name_expr = PathExpr::compile(&self.config.param_name_text_expr())?;
        let value_expr = PathExpr::compile(&self.config.param_value_text_expr())?;
        let mut params = HashMap::new();
        for param in params_expr.select(doc, doc.container()) {
            params.insert(name_expr.string(doc, param), value_expr.string(doc, param));
        }
        Ok(params)
    }

    fn try_remove_all(&mut self) -> Result<(), Error> {
        if let Some(filter) = self.filter()? {
            filter.detach(&mut self.document)?;
        }
        if let Some(mapping) = self.filter_mapping()? {
            mapping.detach(&mut self.document)?;
        }
        Ok(())
    }
}
