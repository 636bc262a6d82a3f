//! End-to-end setter lifecycle on packages in temporary directories.

use std::fs;

use setters::SetterError;
use setters::core::types::Operation;
use setters::io::schema_store::load_schema;
use setters::test_support::{TestPackage, krmfile};
use setters::traverse::{ErrorPolicy, WalkOptions, walk_packages};
use setters::update::{FieldSetter, SetterCreator, SetterDeleter, list_setters};

const PREFIX: &str = "io.k8s.cli.setters.";

const DEPLOYMENT: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app # keep this comment
spec:
  replicas: 3 # {\"$kpt-set\":\"replicas\"}
  template:
    spec:
      containers:
      - name: app
        image: nginx:1.7 # {\"$kpt-set\":\"image\"}
        args: # {\"$kpt-set\":\"args\"}
        - --old
---
apiVersion: v1
kind: Service
metadata:
  name: app
spec:
  ports:
  - port: 80
";

fn package() -> TestPackage {
    TestPackage::new()
        .setter("replicas", "3", Some("integer"))
        .setter("image", "nginx:1.7", None)
        .resource("deploy.yaml", DEPLOYMENT)
        .resource("notes/README.md", "not yaml: [\n")
}

fn set(name: &str, value: &str) -> FieldSetter {
    FieldSetter {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..FieldSetter::default()
    }
}

#[test]
fn replicas_three_to_five() {
    let pkg = package();
    let count = set("replicas", "5")
        .set(&pkg.package(), &pkg.config())
        .expect("set");

    assert_eq!(count, 1);
    let deploy = pkg.read("deploy.yaml");
    assert!(deploy.contains("  replicas: 5 # {\"$kpt-set\":\"replicas\"}\n"));
    assert!(deploy.contains("name: app # keep this comment"));
    assert!(deploy.ends_with("  - port: 80\n"));

    let schema = load_schema(&pkg.package().schema_path, PREFIX).expect("load");
    let replicas = schema.get("replicas").expect("replicas");
    assert_eq!(replicas.value.to_string(), "5");
}

#[test]
fn failed_set_leaves_every_file_unchanged() {
    let pkg = package().resource("zz-broken.yaml", "kind: [unterminated\n");
    let before = pkg.snapshot();

    let err = set("replicas", "5")
        .set(&pkg.package(), &pkg.config())
        .unwrap_err();

    assert!(matches!(err, SetterError::Parse { .. }));
    assert_eq!(pkg.snapshot(), before);
}

#[test]
fn unknown_setter_is_not_found_without_changes() {
    let pkg = package();
    let before = pkg.snapshot();
    let err = set("nope", "1")
        .set(&pkg.package(), &pkg.config())
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(pkg.snapshot(), before);
}

#[test]
fn reapplying_a_value_is_idempotent() {
    let pkg = package();
    let first = set("image", "nginx:1.25")
        .set(&pkg.package(), &pkg.config())
        .expect("set");
    let state = pkg.snapshot();
    let second = set("image", "nginx:1.25")
        .set(&pkg.package(), &pkg.config())
        .expect("set");
    assert_eq!(first, second);
    assert_eq!(pkg.snapshot(), state);
}

#[test]
fn untouched_files_and_documents_survive() {
    let pkg = package().resource("cm.yaml", "apiVersion: v1\nkind: ConfigMap\n");
    set("replicas", "4")
        .set(&pkg.package(), &pkg.config())
        .expect("set");

    assert_eq!(pkg.read("cm.yaml"), "apiVersion: v1\nkind: ConfigMap\n");
    assert_eq!(pkg.read("notes/README.md"), "not yaml: [\n");
    assert!(pkg.read("deploy.yaml").contains("kind: Service"));
}

#[test]
fn list_setter_round_trip() {
    let pkg = package();
    let creator = SetterCreator {
        name: "args".to_string(),
        list_values: Some(vec!["--a".to_string(), "--b".to_string()]),
        setter_type: Some(setters::core::definition::SetterType::Array),
        ..SetterCreator::default()
    };
    let count = creator.create(&pkg.package(), &pkg.config()).expect("create");
    assert_eq!(count, 1);
    let deploy = pkg.read("deploy.yaml");
    assert!(deploy.contains("        args: # {\"$kpt-set\":\"args\"}\n        - --a\n        - --b\n"));
    assert!(!deploy.contains("--old"));

    let listings = list_setters(&pkg.package(), &pkg.config(), Some("args")).expect("list");
    assert_eq!(listings[0].count, 1);
    assert_eq!(listings[0].definition.value.to_string(), "[--a, --b]");
}

#[test]
fn referenced_delete_is_guarded() {
    let pkg = package();
    let before = pkg.snapshot();
    let guarded = SetterDeleter {
        name: "image".to_string(),
        force: false,
    };
    let err = guarded.delete(&pkg.package(), &pkg.config()).unwrap_err();
    assert!(matches!(err, SetterError::Referenced { .. }));
    assert_eq!(pkg.snapshot(), before);

    let forced = SetterDeleter {
        name: "image".to_string(),
        force: true,
    };
    forced.delete(&pkg.package(), &pkg.config()).expect("forced delete");
    assert!(pkg.read("deploy.yaml").contains("        image: nginx:1.7\n"));
    let listings = list_setters(&pkg.package(), &pkg.config(), None).expect("list");
    assert!(listings.iter().all(|listing| listing.definition.name != "image"));
}

#[test]
fn recursive_walk_continues_past_failing_package() {
    let pkg = package()
        .resource("a/Krmfile", &krmfile(&[("other", "x", None)]))
        .resource("a/cm.yaml", "data: {}\n")
        .resource("b/Krmfile", &krmfile(&[("replicas", "1", Some("integer"))]))
        .resource("b/deploy.yaml", "replicas: 1 # {\"$kpt-set\":\"replicas\"}\n");
    let config = pkg.config();
    let setter = set("replicas", "6");

    let options = WalkOptions::new("Krmfile", Operation::Set, true);
    assert_eq!(options.policy, ErrorPolicy::Collect);
    let runs = walk_packages(pkg.path(), &options, |package| setter.set(package, &config))
        .expect("walk");

    let summary: Vec<(bool, usize)> = runs.iter().map(|run| (run.is_ok(), run.count)).collect();
    assert_eq!(summary, vec![(true, 1), (false, 0), (true, 1)]);
    assert!(runs[1].error.as_ref().is_some_and(SetterError::is_not_found));
    assert_eq!(pkg.read("b/deploy.yaml"), "replicas: 6 # {\"$kpt-set\":\"replicas\"}\n");
    assert_eq!(
        fs::read_to_string(pkg.path().join("a/Krmfile")).expect("read"),
        krmfile(&[("other", "x", None)])
    );
}

#[test]
fn recursive_delete_continues_past_package_without_the_setter() {
    let pkg = TestPackage::new()
        .setter("x", "1", None)
        .resource("a/Krmfile", &krmfile(&[("x", "2", None)]))
        .resource("b/Krmfile", &krmfile(&[("y", "3", None)]));
    let config = pkg.config();
    let deleter = SetterDeleter {
        name: "x".to_string(),
        force: false,
    };

    let options = WalkOptions::new("Krmfile", Operation::Delete, true);
    let runs = walk_packages(pkg.path(), &options, |package| deleter.delete(package, &config))
        .expect("walk");

    let outcome: Vec<bool> = runs.iter().map(|run| run.is_ok()).collect();
    assert_eq!(outcome, vec![true, true, false]);
    assert!(runs.iter().all(|run| run.operation == Operation::Delete));
    let err = runs[2].error.as_ref().expect("b fails");
    assert_eq!(err.to_string(), "setter \"x\" does not exist");
    assert!(!pkg.schema_text().contains("io.k8s.cli.setters.x"));
    assert!(!pkg.read("a/Krmfile").contains("io.k8s.cli.setters.x"));
    assert_eq!(pkg.read("b/Krmfile"), krmfile(&[("y", "3", None)]));
}

#[test]
fn non_recursive_walk_fails_fast() {
    let pkg = TestPackage::new();
    let config = pkg.config();
    let options = WalkOptions::new("Krmfile", Operation::Set, false);
    let err = walk_packages(pkg.path(), &options, |package| {
        set("replicas", "1").set(package, &config)
    })
    .unwrap_err();
    assert!(err.is_not_found());
}
