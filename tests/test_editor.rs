use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use webxml_filter::{
    ConfigError, Document, EditorError, Error, FilterConfig, FilterDescriptorEditor,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// Copies a fixture into a fresh temp dir so tests can save freely.
fn fixture(name: &str) -> (TempDir, PathBuf) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("web.xml");
    fs::copy(Path::new("tests/documents").join(name), &path).unwrap();
    (dir, path)
}

fn acs_filter_children(doc: &Document, tag: &str) -> usize {
    let root = doc.root_element().unwrap();
    root.find_all(doc, "filter")
        .into_iter()
        .filter(|f| f.find(doc, "filter-name").unwrap().text_content(doc) == "ACSFilter")
        .map(|f| f.find_all(doc, tag).len())
        .sum()
}

fn count_acs(doc: &Document, tag: &str) -> usize {
    let root = doc.root_element().unwrap();
    root.find_all(doc, tag)
        .into_iter()
        .filter(|e| e.find(doc, "filter-name").unwrap().text_content(doc) == "ACSFilter")
        .count()
}

#[test]
fn set_then_get() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("RelyingPartyRealm", "http://localhost:8080/").unwrap();
    let params = editor.params().unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params["RelyingPartyRealm"], "http://localhost:8080/");
}

#[test]
fn set_existing_updates_in_place() {
    let (_dir, path) = fixture("web_acs.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("RelyingPartyRealm", "v1").unwrap();
    editor.set_param("RelyingPartyRealm", "v2").unwrap();
    editor.set_param("RelyingPartyRealm", "v2").unwrap();

    let doc = editor.document();
    assert_eq!(acs_filter_children(doc, "init-param"), 3);
    let root = doc.root_element().unwrap();
    let acs = root.find_all(doc, "filter")[1];
    let names: Vec<String> = acs
        .find_all(doc, "init-param")
        .iter()
        .map(|p| p.find(doc, "param-name").unwrap().text_content(doc))
        .collect();
    assert_eq!(
        names,
        vec!["PassiveRequestorEndpoint", "RelyingPartyRealm", "SecretKey"]
    );
    assert_eq!(editor.params().unwrap()["RelyingPartyRealm"], "v2");
    // the other filter is untouched
    let log = root.find_all(doc, "filter")[0];
    assert_eq!(log.find_all(doc, "init-param").len(), 1);
}

#[test]
fn filter_and_mapping_created_once() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("a", "1").unwrap();
    editor.set_param("b", "2").unwrap();
    editor.set_param("c", "3").unwrap();

    let doc = editor.document();
    let root = doc.root_element().unwrap();
    assert_eq!(count_acs(doc, "filter"), 1);
    assert_eq!(count_acs(doc, "filter-mapping"), 1);
    assert_eq!(acs_filter_children(doc, "filter-class"), 1);
    assert_eq!(acs_filter_children(doc, "init-param"), 3);

    let children = root.child_elements(doc);
    let filter = children[children.len() - 2];
    let mapping = children[children.len() - 1];
    assert_eq!(filter.full_name(doc), "filter");
    assert_eq!(
        filter.find(doc, "filter-class").unwrap().text_content(doc),
        editor.config().filter_class
    );
    assert_eq!(mapping.full_name(doc), "filter-mapping");
    assert_eq!(mapping.find(doc, "url-pattern").unwrap().text_content(doc), "/*");
}

#[test]
fn mapping_added_when_filter_exists_alone() {
    let (_dir, path) = fixture("web_duplicate.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(count_acs(editor.document(), "filter-mapping"), 0);
    editor.set_param("a", "1").unwrap();
    assert_eq!(count_acs(editor.document(), "filter"), 1);
    assert_eq!(count_acs(editor.document(), "filter-mapping"), 1);
}

#[test]
fn remove_param() {
    let (_dir, path) = fixture("web_acs.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.remove_param("SecretKey").unwrap();
    let params = editor.params().unwrap();
    assert_eq!(params.len(), 2);
    assert!(!params.contains_key("SecretKey"));
    assert_eq!(acs_filter_children(editor.document(), "init-param"), 2);
}

#[test]
fn remove_unknown_param_is_noop() {
    let (_dir, path) = fixture("web_acs.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    let before = editor.document().write_str().unwrap();
    editor.remove_param("NoSuchParam").unwrap();
    // a param of another filter is not ours to remove
    editor.remove_param("level").unwrap();
    assert_eq!(editor.document().write_str().unwrap(), before);
}

#[test]
fn remove_all_without_filter_leaves_document() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    let before = editor.document().write_str().unwrap();
    editor.remove_all().unwrap();
    assert_eq!(editor.document().write_str().unwrap(), before);
}

#[test]
fn remove_all() {
    let (_dir, path) = fixture("web_acs.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.remove_all().unwrap();
    let doc = editor.document();
    let root = doc.root_element().unwrap();
    assert_eq!(count_acs(doc, "filter"), 0);
    assert_eq!(count_acs(doc, "filter-mapping"), 0);
    assert_eq!(root.find_all(doc, "filter").len(), 1);
    assert_eq!(root.find_all(doc, "filter-mapping").len(), 1);
    assert!(editor.params().unwrap().is_empty());
    // a second call finds nothing to remove
    editor.remove_all().unwrap();
}

#[test]
fn params_without_filter_is_empty() {
    let (_dir, path) = fixture("web_empty.xml");
    let editor = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(editor.params().unwrap(), HashMap::new());
}

#[test]
fn params_are_unescaped() {
    let (_dir, path) = fixture("web_acs.xml");
    let editor = FilterDescriptorEditor::open(&path).unwrap();
    let params = editor.params().unwrap();
    assert_eq!(params["SecretKey"], "a&b");
    assert!(!params.contains_key("level"));
}

#[test]
fn duplicate_names_last_wins() {
    let (_dir, path) = fixture("web_duplicate.xml");
    let editor = FilterDescriptorEditor::open(&path).unwrap();
    let params = editor.params().unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params["RelyingPartyRealm"], "second");
}

#[test]
fn duplicate_names_update_first() {
    let (_dir, path) = fixture("web_duplicate.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("RelyingPartyRealm", "third").unwrap();
    // the first occurrence is updated, so the last one still wins on read
    assert_eq!(editor.params().unwrap()["RelyingPartyRealm"], "second");
    editor.remove_param("RelyingPartyRealm").unwrap();
    assert_eq!(editor.params().unwrap()["RelyingPartyRealm"], "second");
    editor.remove_param("RelyingPartyRealm").unwrap();
    assert!(editor.params().unwrap().is_empty());
}

#[test]
fn save_and_reopen() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("a", "1").unwrap();
    editor.save().unwrap();

    let reopened = FilterDescriptorEditor::open(&path).unwrap();
    let mut expected = HashMap::new();
    expected.insert("a".to_string(), "1".to_string());
    assert_eq!(reopened.params().unwrap(), expected);

    let doc = reopened.document();
    let root = doc.root_element().unwrap();
    assert_eq!(root.attribute(doc, "version"), Some("3.0"));
    assert_eq!(
        root.attribute(doc, "xmlns"),
        Some("http://java.sun.com/xml/ns/javaee")
    );
    assert!(root.find(doc, "servlet").is_some());
}

#[test]
fn save_keeps_surrounding_whitespace() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("padded", " v ").unwrap();
    editor.set_param(" key", "1").unwrap();
    editor.save().unwrap();

    let mut reopened = FilterDescriptorEditor::open(&path).unwrap();
    let mut expected = HashMap::new();
    expected.insert("padded".to_string(), " v ".to_string());
    expected.insert(" key".to_string(), "1".to_string());
    assert_eq!(reopened.params().unwrap(), expected);

    // the reopened name still matches, so no second init-param appears
    reopened.set_param(" key", "2").unwrap();
    expected.insert(" key".to_string(), "2".to_string());
    assert_eq!(reopened.params().unwrap(), expected);
    assert_eq!(acs_filter_children(reopened.document(), "init-param"), 2);
}

#[test]
fn multi_line_value_is_read_as_written() {
    let (_dir, path) = fixture("web_multiline.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    let realm = "\n                http://localhost:8080/\n            ";
    assert_eq!(editor.params().unwrap()["RelyingPartyRealm"], realm);
    editor.set_param("a", "1").unwrap();
    editor.save().unwrap();
    let reopened = FilterDescriptorEditor::open(&path).unwrap();
    let params = reopened.params().unwrap();
    assert_eq!(params["RelyingPartyRealm"], realm);
    assert_eq!(params["a"], "1");
    assert_eq!(acs_filter_children(reopened.document(), "init-param"), 2);
}

#[test]
fn save_escapes_values() {
    let (_dir, path) = fixture("web_acs.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("SecretKey", "<k>&\"'").unwrap();
    editor.save().unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("<k>"));
    assert!(raw.contains("<!-- request logging -->"));
    let reopened = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(reopened.params().unwrap()["SecretKey"], "<k>&\"'");
}

#[test]
fn unsaved_changes_do_not_touch_file() {
    let (_dir, path) = fixture("web_empty.xml");
    let before = fs::read(&path).unwrap();
    {
        let mut editor = FilterDescriptorEditor::open(&path).unwrap();
        editor.set_param("a", "1").unwrap();
        editor.remove_all().unwrap();
        editor.set_param("b", "2").unwrap();
    }
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn doctype_descriptor_round_trip() {
    let (_dir, path) = fixture("web_dtd.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("a", "1").unwrap();
    editor.save().unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(raw.contains(
        r#"<!DOCTYPE web-app PUBLIC "-//Sun Microsystems, Inc.//DTD Web Application 2.3//EN" "http://java.sun.com/dtd/web-app_2_3.dtd">"#
    ));
    let reopened = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(reopened.params().unwrap()["a"], "1");
}

#[test]
fn latin1_descriptor_saved_as_utf8() {
    let (_dir, path) = fixture("web_latin1.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("a", "\u{e9}t\u{e9}").unwrap();
    editor.save().unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("<display-name>caf\u{e9}</display-name>"));
    let reopened = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(reopened.params().unwrap()["a"], "\u{e9}t\u{e9}");
}

#[test]
fn empty_arguments_are_rejected() {
    let (_dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    let before = editor.document().write_str().unwrap();
    assert!(matches!(
        editor.set_param("", "x"),
        Err(EditorError::InvalidArgument(_))
    ));
    assert!(matches!(
        editor.set_param("x", ""),
        Err(EditorError::InvalidArgument(_))
    ));
    assert!(matches!(
        editor.remove_param(""),
        Err(EditorError::InvalidArgument(_))
    ));
    assert_eq!(editor.document().write_str().unwrap(), before);
}

#[test]
fn missing_descriptor() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("web.xml");
    let err = FilterDescriptorEditor::open(&path).unwrap_err();
    match &err {
        EditorError::DescriptorNotFound { path: p, .. } => assert_eq!(p, &path),
        other => panic!("unexpected error {:?}", other),
    }
    let msg = err.to_string();
    assert!(msg.starts_with(&path.display().to_string()));
    assert!(msg.ends_with(" file does not exist"));
}

#[test]
fn malformed_descriptor() {
    let (_dir, path) = fixture("malformed.xml");
    let err = FilterDescriptorEditor::open(&path).unwrap_err();
    assert!(matches!(
        err,
        EditorError::DescriptorParse {
            source: Error::MalformedXML(_),
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
    assert!(err
        .to_string()
        .starts_with("Error occurred while parsing web.xml: Malformed XML"));
}

#[test]
fn save_failure() {
    let (dir, path) = fixture("web_empty.xml");
    let mut editor = FilterDescriptorEditor::open(&path).unwrap();
    editor.set_param("a", "1").unwrap();
    dir.close().unwrap();
    let err = editor.save().unwrap_err();
    assert!(matches!(
        err,
        EditorError::Persist {
            source: Error::Io(_),
            ..
        }
    ));
    assert!(err.to_string().starts_with("Error occurred while saving web.xml: "));
}

#[test]
fn custom_filter_config() {
    let (_dir, path) = fixture("web_acs.xml");
    let config = FilterConfig::from_toml_str(
        r#"
        filter_name = "LogFilter"
        filter_class = "com.example.shop.LogFilter"
        "#,
    )
    .unwrap();
    let mut editor = FilterDescriptorEditor::open_with_config(&path, config).unwrap();
    assert_eq!(editor.params().unwrap()["level"], "debug");
    editor.set_param("level", "info").unwrap();
    editor.remove_all().unwrap();
    assert!(editor.params().unwrap().is_empty());

    // the access control filter is still there
    let acs = FilterDescriptorEditor::open(&path).unwrap();
    assert_eq!(acs.params().unwrap().len(), 3);
    let doc = editor.document();
    assert_eq!(count_acs(doc, "filter"), 1);
    assert_eq!(count_acs(doc, "filter-mapping"), 1);
}

#[test]
fn filter_name_override_retargets_every_lookup() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("web.xml");
    fs::write(&path, "<web-app/>").unwrap();
    let config = FilterConfig::from_toml_str(
        r#"
        filter_name = "AuthFilter"
        filter_class = "com.example.AuthFilter"
        "#,
    )
    .unwrap();
    let mut editor = FilterDescriptorEditor::open_with_config(&path, config).unwrap();
    editor.set_param("a", "1").unwrap();
    editor.set_param("b", "2").unwrap();
    editor.set_param("a", "3").unwrap();

    let mut expected = HashMap::new();
    expected.insert("a".to_string(), "3".to_string());
    expected.insert("b".to_string(), "2".to_string());
    assert_eq!(editor.params().unwrap(), expected);

    let doc = editor.document();
    let root = doc.root_element().unwrap();
    let mappings = root.find_all(doc, "filter-mapping");
    assert_eq!(mappings.len(), 1);
    assert_eq!(
        mappings[0].find(doc, "filter-name").unwrap().text_content(doc),
        "AuthFilter"
    );
    let filters = root.find_all(doc, "filter");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].find_all(doc, "init-param").len(), 2);

    editor.remove_all().unwrap();
    let doc = editor.document();
    assert!(doc.root_element().unwrap().child_elements(doc).is_empty());
}

#[test]
fn expression_without_filter_name_is_rejected() {
    let err = FilterConfig::from_toml_str(
        r#"
        filter_name = "AuthFilter"
        filter_expr = "/web-app/filter[filter-name='ACSFilter']"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingPlaceholder { .. }));
}
