/*!
 * Tests for catalog stores
 */

use serde_json::json;

use i18n_translator::catalog::{Catalog, CatalogReader, CatalogWriter, InMemoryCatalog, JsonDirCatalog};

use crate::common;

#[test]
fn test_json_dir_withNestedCatalogs_shouldFlattenAndListLanguages() {
    let dir = common::create_temp_dir().unwrap();
    let i18n = dir.path().join("i18n");
    common::write_catalog(&i18n, "en", &json!({"home": {"title": "Home", "cta": "Start"}, "bye": "Bye"})).unwrap();
    common::write_catalog(&i18n, "fr", &json!({"home": {"title": "Accueil"}})).unwrap();
    std::fs::write(i18n.join("notes.txt"), "not a catalog").unwrap();

    let store = JsonDirCatalog::new(&i18n);
    assert_eq!(store.languages().unwrap(), vec!["en", "fr"]);

    let en = store.read("en").unwrap().unwrap();
    let keys: Vec<&String> = en.keys().collect();
    assert_eq!(keys, vec!["home.title", "home.cta", "bye"]);
    assert_eq!(en.text("home.cta"), Some("Start"));
    assert!(store.read("de").unwrap().is_none());
}

#[test]
fn test_json_dir_withNonObjectFile_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    common::write_catalog(dir.path(), "fr", &json!(["not", "an", "object"])).unwrap();

    let store = JsonDirCatalog::new(dir.path());
    assert!(store.read("fr").is_err());
}

#[test]
fn test_json_dir_write_withNewLanguage_shouldCreateNestedFile() {
    let dir = common::create_temp_dir().unwrap();
    let store = JsonDirCatalog::new(dir.path());

    let mut catalog = Catalog::new();
    catalog.set_text("home.title", "Startseite");
    catalog.set_text("bye", "Tschüss");
    store.write("de", &catalog).unwrap();

    let written = common::read_json(&store.path_for("de"));
    assert_eq!(written, json!({"home": {"title": "Startseite"}, "bye": "Tschüss"}));
}

#[test]
fn test_missing_values_withNullAndBlank_shouldCountAsMissing() {
    let catalog = Catalog::from_flat_json(json!({"a": null, "b": "  ", "c": "ok"}));
    assert!(catalog.is_missing("a"));
    assert!(catalog.is_missing("b"));
    assert!(!catalog.is_missing("c"));
    assert!(catalog.is_missing("absent"));
}

#[test]
fn test_in_memory_store_withWrites_shouldCountThem() {
    let store = InMemoryCatalog::new().with_catalog("en", Catalog::from_flat_json(json!({"a": "A"})));
    assert_eq!(store.write_count(), 0);

    store.write("fr", &Catalog::from_flat_json(json!({"a": "Ah"}))).unwrap();
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.snapshot("fr").unwrap().text("a"), Some("Ah"));
    assert_eq!(store.languages().unwrap(), vec!["en", "fr"]);
}
