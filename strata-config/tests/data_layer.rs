use serde_json::json;
use std::io::Write;
use strata_config::{ConfigError, DataLayer, DataLayerConfig};
use strata_core::prelude::*;

const LAYER: &str = r#"
[[models]]
name = "User"
id_property = "email"
fields = [
    { name = "name", type = "string" },
    { name = "group", type = "string" },
    { name = "age", type = "int" },
]

[[stores]]
id = "users"
model = "User"
autoload = true
sorters = [{ property = "age", direction = "desc" }]

[stores.proxy]
type = "memory"
rows = [
    { name = "Ed Spencer", email = "ed@sencha.com", group = "code", age = 25 },
    { name = "Abe Elias", email = "abe@sencha.com", group = "admin", age = 20 },
    { name = "Aaron Conran", email = "aaron@sencha.com", group = "admin", age = 26 },
    { name = "Tommy Maintz", email = "tommy@sencha.com", group = "code", age = 70 },
]

[[views]]
id = "coders"
source = "users"
filters = [{ property = "group", value = "code" }]

[[views]]
id = "young-coders"
source = "coders"
filters = [{ property = "age", operator = "<", value = 30 }]
"#;

fn emails(source: &impl RecordAccess) -> Vec<String> {
    source
        .get_range()
        .iter()
        .map(|r| r.get("email").to_string())
        .collect()
}

#[tokio::test]
async fn builds_and_autoloads_a_chained_layer() {
    let config = DataLayerConfig::parse_from_str(LAYER, "test").unwrap();
    let layer = DataLayer::build(config).unwrap();

    assert_eq!(layer.get("users").unwrap().get_count(), 0);
    let loaded = layer.autoload().await.unwrap();
    assert_eq!(loaded, vec![("users".to_string(), 4)]);

    let users = layer.store("users").unwrap();
    assert_eq!(
        emails(users),
        ["tommy@sencha.com", "aaron@sencha.com", "ed@sencha.com", "abe@sencha.com"]
    );
    assert_eq!(
        emails(layer.view("coders").unwrap()),
        ["tommy@sencha.com", "ed@sencha.com"]
    );
    assert_eq!(
        emails(layer.view("young-coders").unwrap()),
        ["ed@sencha.com"]
    );

    assert_eq!(
        layer.summary(),
        vec![
            ("coders".to_string(), 2),
            ("users".to_string(), 4),
            ("young-coders".to_string(), 1)
        ]
    );
}

#[tokio::test]
async fn file_proxy_store_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut rows = std::fs::File::create(dir.path().join("users.json")).unwrap();
    write!(
        rows,
        "{}",
        json!({"data": [{"email": "solo@sencha.com", "age": "41"}], "total": 1})
    )
    .unwrap();

    let config_path = dir.path().join("strata.json");
    std::fs::write(
        &config_path,
        json!({
            "models": [{"name": "User", "id_property": "email",
                        "fields": [{"name": "age", "type": "int"}]}],
            "stores": [{"id": "users", "model": "User", "autoload": true,
                        "proxy": {"type": "file", "path": "users.json"}}]
        })
        .to_string(),
    )
    .unwrap();

    let layer = DataLayer::build(DataLayerConfig::load_from_file(&config_path).unwrap()).unwrap();
    layer.autoload().await.unwrap();

    let users = layer.store("users").unwrap();
    assert_eq!(users.get_count(), 1);
    assert_eq!(users.get_at(0).unwrap().get("age"), FieldValue::Int(41));
}

#[test]
fn unknown_model_is_rejected() {
    let config = DataLayerConfig::parse_json(
        r#"{"stores": [{"id": "users", "model": "Ghost"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        DataLayer::build(config),
        Err(ConfigError::UnknownModel { ref model, .. }) if model == "Ghost"
    ));
}

#[test]
fn view_cycles_are_rejected() {
    let config = DataLayerConfig::parse_json(
        r#"{
            "models": [{"name": "M"}],
            "stores": [{"id": "s", "model": "M"}],
            "views": [
                {"id": "a", "source": "b"},
                {"id": "b", "source": "a"}
            ]
        }"#,
    )
    .unwrap();
    assert!(matches!(
        DataLayer::build(config),
        Err(ConfigError::Cycle { .. })
    ));
}

#[test]
fn duplicate_ids_are_rejected() {
    let config = DataLayerConfig::parse_json(
        r#"{
            "models": [{"name": "M"}],
            "stores": [{"id": "s", "model": "M"}],
            "views": [{"id": "s", "source": "s"}]
        }"#,
    )
    .unwrap();
    assert!(matches!(
        DataLayer::build(config),
        Err(ConfigError::DuplicateId { .. })
    ));
}

#[test]
fn resolved_views_outlive_the_layer() {
    let config = DataLayerConfig::parse_from_str(LAYER, "test").unwrap();
    let layer = DataLayer::build(config).unwrap();
    let coders = DerivedView::from_registry(layer.registry(), "coders").unwrap();
    assert_eq!(coders.get_count(), 0);

    drop(layer);
    let users = coders.get_source().unwrap();
    assert!(!users.is_destroyed());
    assert_eq!(users.get_count(), 0);
}
