//! Transactional updates of a package's schema and its resources.
//!
//! Every mutating operation runs as a [`Transaction`]: capture the schema
//! file, mutate the in-memory schema, persist it, reload it from disk, then
//! apply it to the resources. A failure after the schema was written restores
//! the captured bytes, so the schema never disagrees with the resources.

use tracing::{debug, info, warn};

use crate::core::definition::{Constraints, SetterDefinition, SetterType, SetterValue};
use crate::core::filter::BindingCounter;
use crate::core::schema::SchemaDocument;
use crate::core::setter_filter::{ClearFilter, SetterFilter};
use crate::error::{Result, SetterError};
use crate::io::config::SettersConfig;
use crate::io::packages::Package;
use crate::io::pipeline::{PackageReadWriter, Pipeline};
use crate::io::schema_store::{SchemaSnapshot, load_schema, persist_schema};

/// Progress of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Start,
    SchemaRead,
    SchemaUpdated,
    SchemaReloaded,
    ResourcesApplied,
    SchemaReverted,
}

/// One schema mutation followed by its application to the resources.
#[derive(Debug)]
pub struct Transaction<'a> {
    package: &'a Package,
    config: &'a SettersConfig,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub fn new(package: &'a Package, config: &'a SettersConfig) -> Self {
        Self {
            package,
            config,
            state: TransactionState::Start,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Run `mutate` on the schema, persist it, then `apply` the reloaded
    /// schema to the package resources. Returns what `apply` returns.
    ///
    /// Errors from `mutate` leave the file untouched. Later errors, including
    /// a failed write of the schema, restore the captured bytes before being
    /// returned.
    pub fn run<M, A>(&mut self, mutate: M, apply: A) -> Result<usize>
    where
        M: FnOnce(&mut SchemaDocument) -> Result<()>,
        A: FnOnce(&SchemaDocument) -> Result<usize>,
    {
        let (package, config) = (self.package, self.config);
        let path = &package.schema_path;
        let snapshot = SchemaSnapshot::capture(path)?;
        let mut schema = SchemaDocument::parse(path, snapshot.text()?, &config.definition_prefix)?;
        self.state = TransactionState::SchemaRead;

        mutate(&mut schema)?;

        let applied = (|| -> Result<usize> {
            persist_schema(&schema)?;
            self.state = TransactionState::SchemaUpdated;
            debug!(path = %path.display(), "schema updated");
            let reloaded = load_schema(path, &config.definition_prefix)?;
            self.state = TransactionState::SchemaReloaded;
            let count = apply(&reloaded)?;
            self.state = TransactionState::ResourcesApplied;
            Ok(count)
        })();

        applied.map_err(|err| self.revert(&snapshot, err))
    }

    fn revert(&mut self, snapshot: &SchemaSnapshot, err: SetterError) -> SetterError {
        warn!(path = %snapshot.path().display(), error = %err, "reverting schema");
        match snapshot.restore() {
            Ok(()) => {
                self.state = TransactionState::SchemaReverted;
                err
            }
            Err(source) => SetterError::RevertFailed {
                path: snapshot.path().to_path_buf(),
                original: err.to_string(),
                source,
            },
        }
    }
}

/// Run a setter filter built from `schema` over the package resources.
fn apply_setters(
    package: &Package,
    config: &SettersConfig,
    mut filter: SetterFilter<'_>,
) -> Result<usize> {
    let mut read_writer = PackageReadWriter::new(&package.dir, config).no_delete_files(true);
    Pipeline::new(&mut read_writer)
        .filter(&mut filter)
        .execute()?;
    Ok(filter.count())
}

/// Changes the value of an existing setter and every field bound to it.
#[derive(Debug, Clone, Default)]
pub struct FieldSetter {
    pub name: String,
    pub value: Option<String>,
    pub list_values: Option<Vec<String>>,
    pub description: Option<String>,
    pub set_by: Option<String>,
}

impl FieldSetter {
    /// Returns the number of fields written.
    pub fn set(&self, package: &Package, config: &SettersConfig) -> Result<usize> {
        let value =
            SetterValue::from_parts(&self.name, self.value.clone(), self.list_values.clone())?;
        let count = Transaction::new(package, config).run(
            |schema| {
                let current = schema
                    .get(&self.name)
                    .ok_or_else(|| SetterError::SetterNotFound {
                        name: self.name.clone(),
                    })?;
                let next = current.updated(
                    value,
                    self.description.as_deref(),
                    self.set_by.as_deref(),
                );
                schema.upsert(next)
            },
            |schema| apply_setters(package, config, SetterFilter::single(&self.name, schema)),
        )?;
        info!(setter = %self.name, package = %package.dir.display(), count, "set setter");
        Ok(count)
    }
}

/// Adds a new setter definition and applies it to already-bound fields.
#[derive(Debug, Clone, Default)]
pub struct SetterCreator {
    pub name: String,
    pub value: Option<String>,
    pub list_values: Option<Vec<String>>,
    pub setter_type: Option<SetterType>,
    pub description: String,
    pub set_by: String,
    pub constraints: Option<Constraints>,
}

impl SetterCreator {
    pub fn definition(&self) -> Result<SetterDefinition> {
        let value =
            SetterValue::from_parts(&self.name, self.value.clone(), self.list_values.clone())?;
        let mut definition = SetterDefinition::new(&self.name, value);
        definition.setter_type = self.setter_type;
        definition.description = self.description.clone();
        definition.set_by = self.set_by.clone();
        definition.constraints = self.constraints.clone().filter(|c| !c.is_empty());
        Ok(definition)
    }

    /// Returns the number of already-bound fields written.
    pub fn create(&self, package: &Package, config: &SettersConfig) -> Result<usize> {
        let definition = self.definition()?;
        let count = Transaction::new(package, config).run(
            |schema| {
                if schema.contains(&self.name) {
                    return Err(SetterError::AlreadyExists {
                        name: self.name.clone(),
                    });
                }
                schema.upsert(definition)
            },
            |schema| apply_setters(package, config, SetterFilter::single(&self.name, schema)),
        )?;
        info!(setter = %self.name, package = %package.dir.display(), count, "created setter");
        Ok(count)
    }
}

/// Removes a setter definition.
///
/// Fields still bound to the setter block the delete unless `force` is set,
/// in which case their markers are removed and their values kept.
#[derive(Debug, Clone, Default)]
pub struct SetterDeleter {
    pub name: String,
    pub force: bool,
}

impl SetterDeleter {
    /// Returns the number of bindings cleared.
    pub fn delete(&self, package: &Package, config: &SettersConfig) -> Result<usize> {
        let count = Transaction::new(package, config).run(
            |schema| schema.remove(&self.name).map(|_| ()),
            |_| {
                let mut filter = ClearFilter::new(&self.name, self.force);
                let mut read_writer =
                    PackageReadWriter::new(&package.dir, config).no_delete_files(true);
                Pipeline::new(&mut read_writer)
                    .filter(&mut filter)
                    .execute()?;
                Ok(filter.count())
            },
        )?;
        info!(setter = %self.name, package = %package.dir.display(), count, "deleted setter");
        Ok(count)
    }
}

/// A setter definition and the number of fields bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SetterListing {
    pub definition: SetterDefinition,
    pub count: usize,
}

/// Definitions of a package with binding counts, optionally just `name`.
pub fn list_setters(
    package: &Package,
    config: &SettersConfig,
    name: Option<&str>,
) -> Result<Vec<SetterListing>> {
    let schema = load_schema(&package.schema_path, &config.definition_prefix)?;
    if let Some(name) = name
        && !schema.contains(name)
    {
        return Err(SetterError::SetterNotFound {
            name: name.to_string(),
        });
    }

    let mut counter = BindingCounter::default();
    let mut read_writer = PackageReadWriter::new(&package.dir, config).no_delete_files(true);
    Pipeline::new(&mut read_writer)
        .filter(&mut counter)
        .execute()?;

    Ok(schema
        .definitions()
        .filter(|definition| name.is_none_or(|name| definition.name == name))
        .map(|definition| SetterListing {
            definition: definition.clone(),
            count: counter.count(&definition.name),
        })
        .collect())
}

/// Apply every definition in `schema` to the resources under each of `dirs`.
///
/// The schema itself is not modified. Returns the total number of fields
/// written.
pub fn set_all_setter_definitions(
    schema: &SchemaDocument,
    dirs: &[Package],
    config: &SettersConfig,
) -> Result<usize> {
    let mut total = 0;
    for package in dirs {
        let count = apply_setters(package, config, SetterFilter::all(schema))?;
        debug!(package = %package.dir.display(), count, "applied all setters");
        total += count;
    }
    Ok(total)
}

/// Re-apply a package's own definitions to its resources.
pub fn sync_package(package: &Package, config: &SettersConfig) -> Result<usize> {
    let schema = load_schema(&package.schema_path, &config.definition_prefix)?;
    set_all_setter_definitions(&schema, std::slice::from_ref(package), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestPackage;

    const DEPLOY: &str = "\
apiVersion: apps/v1
kind: Deployment
spec:
  replicas: 3 # {\"$kpt-set\":\"replicas\"}
";

    fn replicas_package() -> TestPackage {
        TestPackage::new()
            .setter("replicas", "3", Some("integer"))
            .resource("deploy.yaml", DEPLOY)
    }

    fn set(name: &str, value: &str) -> FieldSetter {
        FieldSetter {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..FieldSetter::default()
        }
    }

    #[test]
    fn set_updates_schema_and_bound_field() {
        let pkg = replicas_package();
        let count = set("replicas", "5")
            .set(&pkg.package(), &pkg.config())
            .expect("set");
        assert_eq!(count, 1);
        assert!(pkg.read("deploy.yaml").contains("  replicas: 5 # {\"$kpt-set\":\"replicas\"}"));

        let schema = load_schema(&pkg.package().schema_path, "io.k8s.cli.setters.").expect("load");
        assert_eq!(
            schema.get("replicas").map(|def| def.value.clone()),
            Some(SetterValue::Scalar("5".to_string()))
        );
        // Stored as a string, never as the bare number.
        assert!(
            pkg.schema_text()
                .lines()
                .any(|line| matches!(line.trim(), "value: '5'" | "value: \"5\""))
        );
    }

    #[test]
    fn unknown_setter_changes_nothing() {
        let pkg = replicas_package();
        let before = pkg.snapshot();
        let err = set("missing", "1")
            .set(&pkg.package(), &pkg.config())
            .unwrap_err();
        assert!(matches!(err, SetterError::SetterNotFound { .. }));
        assert_eq!(pkg.snapshot(), before);
    }

    #[test]
    fn validation_failure_leaves_schema_untouched() {
        let pkg = replicas_package();
        let before = pkg.snapshot();
        let err = set("replicas", "many")
            .set(&pkg.package(), &pkg.config())
            .unwrap_err();
        assert!(matches!(err, SetterError::Validation { .. }));
        assert_eq!(pkg.snapshot(), before);
    }

    #[test]
    fn resource_failure_reverts_schema() {
        let pkg = replicas_package().resource("broken.yaml", "a: [1, 2\n");
        let schema_before = pkg.schema_text();
        let package = pkg.package();
        let config = pkg.config();

        let mut transaction = Transaction::new(&package, &config);
        let err = transaction
            .run(
                |schema| {
                    let current = schema.get("replicas").cloned().expect("defined");
                    schema.upsert(current.updated(
                        SetterValue::Scalar("5".to_string()),
                        None,
                        None,
                    ))
                },
                |schema| apply_setters(&package, &config, SetterFilter::single("replicas", schema)),
            )
            .unwrap_err();
        assert!(matches!(err, SetterError::Parse { .. }));
        assert_eq!(transaction.state(), TransactionState::SchemaReverted);
        assert_eq!(pkg.schema_text(), schema_before);
    }

    #[test]
    fn successful_transaction_ends_with_resources_applied() {
        let pkg = replicas_package();
        let package = pkg.package();
        let config = pkg.config();
        let mut transaction = Transaction::new(&package, &config);
        assert_eq!(transaction.state(), TransactionState::Start);
        let count = transaction.run(|_| Ok(()), |_| Ok(7)).expect("run");
        assert_eq!(count, 7);
        assert_eq!(transaction.state(), TransactionState::ResourcesApplied);
    }

    #[test]
    fn set_twice_is_idempotent() {
        let pkg = replicas_package();
        let first = set("replicas", "5")
            .set(&pkg.package(), &pkg.config())
            .expect("set");
        let after_first = pkg.snapshot();
        let second = set("replicas", "5")
            .set(&pkg.package(), &pkg.config())
            .expect("set");
        assert_eq!(first, second);
        assert_eq!(pkg.snapshot(), after_first);
    }

    #[test]
    fn value_and_list_values_conflict() {
        let pkg = replicas_package();
        let setter = FieldSetter {
            name: "replicas".to_string(),
            value: Some("1".to_string()),
            list_values: Some(vec!["a".to_string()]),
            ..FieldSetter::default()
        };
        let err = setter.set(&pkg.package(), &pkg.config()).unwrap_err();
        assert!(matches!(err, SetterError::Conflict { .. }));
    }

    #[test]
    fn create_rejects_existing_setter() {
        let pkg = replicas_package();
        let creator = SetterCreator {
            name: "replicas".to_string(),
            value: Some("1".to_string()),
            ..SetterCreator::default()
        };
        let err = creator.create(&pkg.package(), &pkg.config()).unwrap_err();
        assert!(matches!(err, SetterError::AlreadyExists { .. }));
    }

    #[test]
    fn create_applies_to_existing_markers() {
        let pkg = TestPackage::new().resource(
            "cm.yaml",
            "data:\n  image: nginx # {\"$kpt-set\":\"image\"}\n",
        );
        let creator = SetterCreator {
            name: "image".to_string(),
            value: Some("nginx:1.25".to_string()),
            setter_type: Some(SetterType::String),
            description: "container image".to_string(),
            ..SetterCreator::default()
        };
        let count = creator.create(&pkg.package(), &pkg.config()).expect("create");
        assert_eq!(count, 1);
        assert!(pkg.read("cm.yaml").contains("image: nginx:1.25 #"));
        assert!(pkg.schema_text().contains("description: container image"));
    }

    #[test]
    fn delete_referenced_setter_is_refused_and_reverted() {
        let pkg = replicas_package();
        let before = pkg.snapshot();
        let deleter = SetterDeleter {
            name: "replicas".to_string(),
            force: false,
        };
        let err = deleter.delete(&pkg.package(), &pkg.config()).unwrap_err();
        assert!(matches!(err, SetterError::Referenced { count: 1, .. }));
        assert_eq!(pkg.snapshot(), before);
    }

    #[test]
    fn delete_is_refused_for_block_scalar_bindings() {
        let pkg = TestPackage::new()
            .setter("script", "echo hi", None)
            .resource(
                "cm.yaml",
                "data:\n  script: | # {\"$kpt-set\":\"script\"}\n    echo hi\n",
            );
        let before = pkg.snapshot();

        let listings = list_setters(&pkg.package(), &pkg.config(), Some("script")).expect("list");
        assert_eq!(listings[0].count, 1);

        let deleter = SetterDeleter {
            name: "script".to_string(),
            force: false,
        };
        let err = deleter.delete(&pkg.package(), &pkg.config()).unwrap_err();
        assert!(matches!(err, SetterError::Referenced { count: 1, .. }));
        assert_eq!(pkg.snapshot(), before);
    }

    #[test]
    fn set_on_block_scalar_binding_fails_and_reverts() {
        let pkg = TestPackage::new()
            .setter("script", "echo hi", None)
            .resource(
                "cm.yaml",
                "data:\n  script: | # {\"$kpt-set\":\"script\"}\n    echo hi\n",
            );
        let before = pkg.snapshot();
        let err = set("script", "echo bye")
            .set(&pkg.package(), &pkg.config())
            .unwrap_err();
        assert!(matches!(err, SetterError::Parse { .. }));
        assert_eq!(pkg.snapshot(), before);
    }

    #[test]
    fn string_setter_quotes_yaml11_booleans() {
        let pkg = TestPackage::new()
            .setter("flag", "x", Some("string"))
            .resource("cm.yaml", "data:\n  flag: x # {\"$kpt-set\":\"flag\"}\n");
        set("flag", "on")
            .set(&pkg.package(), &pkg.config())
            .expect("set");
        assert_eq!(
            pkg.read("cm.yaml"),
            "data:\n  flag: \"on\" # {\"$kpt-set\":\"flag\"}\n"
        );
    }

    #[test]
    fn forced_delete_clears_markers() {
        let pkg = replicas_package();
        let deleter = SetterDeleter {
            name: "replicas".to_string(),
            force: true,
        };
        let count = deleter.delete(&pkg.package(), &pkg.config()).expect("delete");
        assert_eq!(count, 1);
        assert!(pkg.read("deploy.yaml").ends_with("  replicas: 3\n"));
        assert!(!pkg.schema_text().contains("io.k8s.cli.setters.replicas"));
    }

    #[test]
    fn list_reports_counts_and_filters_by_name() {
        let pkg = replicas_package().setter("image", "nginx", None);
        let all = list_setters(&pkg.package(), &pkg.config(), None).expect("list");
        let summary: Vec<(&str, usize)> = all
            .iter()
            .map(|listing| (listing.definition.name.as_str(), listing.count))
            .collect();
        assert_eq!(summary, vec![("image", 0), ("replicas", 1)]);

        let one = list_setters(&pkg.package(), &pkg.config(), Some("replicas")).expect("list");
        assert_eq!(one.len(), 1);
        assert!(
            list_setters(&pkg.package(), &pkg.config(), Some("nope"))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn sync_rewrites_drifted_fields_without_touching_schema() {
        let pkg = TestPackage::new()
            .setter("replicas", "4", Some("integer"))
            .resource("deploy.yaml", DEPLOY);
        let schema_before = pkg.schema_text();
        let count = sync_package(&pkg.package(), &pkg.config()).expect("sync");
        assert_eq!(count, 1);
        assert!(pkg.read("deploy.yaml").contains("replicas: 4 #"));
        assert_eq!(pkg.schema_text(), schema_before);
    }
}
