//! Resolution pipeline: reads data files, resolves names, builds the registry.
//!
//! A data directory holds `kinds.{ron,toml,json}` (required) and optionally
//! `parts.*` and `system.*`. Kinds are frozen into a [`KindRegistry`];
//! parts are resolved into [`PartSpec`] templates against it.

use crate::schema::*;
use flowgrid_core::container::ContainerConfig;
use flowgrid_core::fixed::{Fixed64, f64_to_fixed64};
use flowgrid_core::id::{FlowKindId, NetworkFamilyId};
use flowgrid_core::kind::{
    Color, DestroyEffect, FlowValueKind, KindRegistry, KindRegistryBuilder, RegistryError,
};
use flowgrid_core::part::{PartSpec, RequesterSettings};
use flowgrid_core::role::{Role, RoleSet};
use flowgrid_core::system::{FlowSystem, SystemConfig};
use flowgrid_spatial::Footprint;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A value is out of its allowed range.
    #[error("invalid value in {file}: {detail}")]
    Invalid { file: PathBuf, detail: String },

    #[error("registry rejected {file}: {source}")]
    Registry {
        file: PathBuf,
        #[source]
        source: RegistryError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan `dir` for `{base_name}.ron`, `.toml` or `.json`.
///
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Deserialize `content` in `format`. `path` is only used for errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(path, e)),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

/// Deserialize a list. TOML files keep the array under `toml_key` in a
/// top-level table; RON and JSON files hold the list directly.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    if format != Format::Toml {
        return deserialize_str(&content, format, path);
    }
    let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .get(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
        .clone();
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name, returning `UnresolvedRef` if it is unknown.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

fn non_negative(value: f64, what: &str, owner: &str, file: &Path) -> Result<Fixed64, DataLoadError> {
    let invalid = || DataLoadError::Invalid {
        file: file.to_path_buf(),
        detail: format!("{what} of '{owner}' must be a non-negative number in range, got {value}"),
    };
    if value < 0.0 {
        return Err(invalid());
    }
    f64_to_fixed64(value).ok_or_else(invalid)
}

// ===========================================================================
// Resolution
// ===========================================================================

/// A resolved part template: what to spawn and how much room it takes.
#[derive(Debug, Clone, PartialEq)]
pub struct PartTemplate {
    pub spec: PartSpec,
    pub footprint: Footprint,
}

/// Everything a data directory defines.
#[derive(Debug, Clone)]
pub struct FlowData {
    pub registry: KindRegistry,
    pub parts: BTreeMap<String, PartTemplate>,
    pub config: SystemConfig,
    pub controller_families: Vec<NetworkFamilyId>,
}

impl FlowData {
    pub fn part(&self, name: &str) -> Option<&PartTemplate> {
        self.parts.get(name)
    }

    /// A fresh, empty flow system configured from this data.
    pub fn build_system(&self) -> FlowSystem {
        let mut system = FlowSystem::new(self.registry.clone(), self.config.clone());
        for &family in &self.controller_families {
            system.require_controller(family);
        }
        system
    }
}

fn build_kind(data: &KindData, file: &Path) -> Result<FlowValueKind, DataLoadError> {
    let mut kind = FlowValueKind::new(&data.name)
        .with_viscosity(non_negative(data.viscosity, "viscosity", &data.name, file)?)
        .with_capacity_factor(non_negative(
            data.capacity_factor,
            "capacity_factor",
            &data.name,
            file,
        )?)
        .with_shared_capacity(data.shares_capacity)
        .with_destroy_effect(match data.destroy_effect {
            DestroyEffectData::Release => DestroyEffect::Release,
            DestroyEffectData::Explode => DestroyEffect::Explode,
        });
    if let Some(label) = &data.label {
        kind = kind.with_label(label);
    }
    if let Some([r, g, b, a]) = data.color {
        kind = kind.with_color(Color::rgba(r, g, b, a));
    }
    Ok(kind)
}

/// Freeze kind definitions into a registry, in file order.
pub fn build_registry(kinds: &[KindData], file: &Path) -> Result<KindRegistry, DataLoadError> {
    let mut builder = KindRegistryBuilder::new();
    for data in kinds {
        builder.register(build_kind(data, file)?);
    }
    builder.build().map_err(|source| DataLoadError::Registry {
        file: file.to_path_buf(),
        source,
    })
}

fn role_of(data: RoleData) -> Role {
    match data {
        RoleData::Producer => Role::Producer,
        RoleData::Consumer => Role::Consumer,
        RoleData::Storage => Role::Storage,
        RoleData::Requester => Role::Requester,
        RoleData::Transmitter => Role::Transmitter,
        RoleData::Controller => Role::Controller,
    }
}

fn resolve_kinds(
    names: &[String],
    kind_ids: &HashMap<String, FlowKindId>,
    file: &Path,
) -> Result<Vec<FlowKindId>, DataLoadError> {
    names
        .iter()
        .map(|n| resolve_name(kind_ids, n, file, "flow kind").copied())
        .collect()
}

fn resolve_requester(
    data: &RequesterData,
    owner: &str,
    kind_ids: &HashMap<String, FlowKindId>,
    file: &Path,
) -> Result<RequesterSettings, DataLoadError> {
    match data.mode {
        RequestModeData::Automatic => {
            let target = non_negative(data.target_fill, "target_fill", owner, file)?;
            let kinds = resolve_kinds(&data.kinds, kind_ids, file)?;
            Ok(RequesterSettings::automatic(target, &kinds))
        }
        RequestModeData::Manual => {
            let mut amounts = BTreeMap::new();
            for (name, amount) in &data.amounts {
                let id = *resolve_name(kind_ids, name, file, "flow kind")?;
                amounts.insert(id, non_negative(*amount, "requested amount", owner, file)?);
            }
            Ok(RequesterSettings::manual(amounts))
        }
    }
}

/// Resolve part definitions against `registry`.
pub fn resolve_parts(
    parts: &[PartData],
    registry: &KindRegistry,
    file: &Path,
) -> Result<BTreeMap<String, PartTemplate>, DataLoadError> {
    let kind_ids: HashMap<String, FlowKindId> = registry
        .iter()
        .map(|(id, kind)| (kind.name.clone(), id))
        .collect();
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut templates = BTreeMap::new();

    for data in parts {
        check_duplicate(&seen, &data.name, file)?;
        seen.insert(data.name.clone(), ());

        let roles: RoleSet = data.roles.iter().map(|r| role_of(*r)).collect();
        let mut spec = PartSpec::new(&data.name, roles)
            .with_family(NetworkFamilyId(data.family))
            .with_store_evenly(data.store_evenly);

        if let Some(container) = &data.container {
            let capacity = non_negative(container.capacity, "capacity", &data.name, file)?;
            let accepted = resolve_kinds(&container.accepts, &kind_ids, file)?;
            let mut config = ContainerConfig::new(capacity, accepted);
            if container.exclusive {
                config = config.exclusive();
            }
            spec = spec.with_container(config);
        }
        for (role, names) in &data.role_kinds {
            spec = spec.with_role_kinds(role_of(*role), resolve_kinds(names, &kind_ids, file)?);
        }
        if let Some(requester) = &data.requester {
            spec = spec.with_requester(resolve_requester(requester, &data.name, &kind_ids, file)?);
        }

        let footprint = Footprint::new(data.footprint.width, data.footprint.height);
        templates.insert(data.name.clone(), PartTemplate { spec, footprint });
    }
    Ok(templates)
}

fn resolve_system(data: &SystemData, file: &Path) -> Result<SystemConfig, DataLoadError> {
    Ok(SystemConfig {
        base_unit: non_negative(data.base_unit, "base_unit", "system", file)?,
        max_path_depth: data.max_path_depth,
    })
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Load every data file in `dir`.
pub fn load_flow_data(dir: &Path) -> Result<FlowData, DataLoadError> {
    let kinds_path = require_data_file(dir, "kinds")?;
    let kinds: Vec<KindData> = deserialize_list(&kinds_path, "kinds")?;
    let registry = build_registry(&kinds, &kinds_path)?;

    let parts = match find_data_file(dir, "parts")? {
        Some(path) => {
            let data: Vec<PartData> = deserialize_list(&path, "parts")?;
            resolve_parts(&data, &registry, &path)?
        }
        None => BTreeMap::new(),
    };

    let (config, controller_families) = match find_data_file(dir, "system")? {
        Some(path) => {
            let data: SystemData = deserialize_file(&path)?;
            let families = data
                .controller_families
                .iter()
                .map(|f| NetworkFamilyId(*f))
                .collect();
            (resolve_system(&data, &path)?, families)
        }
        None => (SystemConfig::default(), Vec::new()),
    };

    tracing::debug!(
        dir = %dir.display(),
        kinds = registry.len(),
        parts = parts.len(),
        "flow data loaded"
    );
    Ok(FlowData {
        registry,
        parts,
        config,
        controller_families,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "flowgrid_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const KINDS_RON: &str = r#"[
        (name: "steam", color: Some((1.0, 1.0, 1.0, 1.0))),
        (name: "oil", viscosity: 2.0, shares_capacity: false, destroy_effect: explode),
    ]"#;

    // -----------------------------------------------------------------------
    // Format and discovery
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("kinds.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("kinds.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("kinds.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("kinds.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("kinds.ron"), "[]").unwrap();
        fs::write(dir.join("kinds.json"), "[]").unwrap();
        assert!(matches!(
            find_data_file(&dir, "kinds"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn missing_kinds_file_is_required() {
        let dir = make_test_dir("missing");
        assert!(matches!(
            load_flow_data(&dir),
            Err(DataLoadError::MissingRequired { .. })
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Kinds
    // -----------------------------------------------------------------------

    #[test]
    fn kinds_load_from_every_format() {
        let json = r#"[{"name": "steam"}, {"name": "oil", "viscosity": 2.0}]"#;
        let toml = "[[kinds]]\nname = \"steam\"\n\n[[kinds]]\nname = \"oil\"\nviscosity = 2.0\n";
        for (suffix, file, content) in [
            ("ron", "kinds.ron", KINDS_RON),
            ("json", "kinds.json", json),
            ("toml", "kinds.toml", toml),
        ] {
            let dir = make_test_dir(suffix);
            fs::write(dir.join(file), content).unwrap();
            let data = load_flow_data(&dir).unwrap();
            assert_eq!(data.registry.len(), 2);
            let oil = data.registry.kind_id("oil").unwrap();
            assert_eq!(data.registry.get(oil).unwrap().viscosity, Fixed64::from_num(2));
            assert!(data.parts.is_empty());
            cleanup(&dir);
        }
    }

    #[test]
    fn kind_fields_are_resolved() {
        let kinds: Vec<KindData> = ron::from_str(KINDS_RON).unwrap();
        let registry = build_registry(&kinds, Path::new("kinds.ron")).unwrap();
        let oil = registry.get(registry.kind_id("oil").unwrap()).unwrap();
        assert!(!oil.shares_capacity);
        assert_eq!(oil.destroy_effect, DestroyEffect::Explode);
        let steam = registry.get(registry.kind_id("steam").unwrap()).unwrap();
        assert_eq!(steam.color, Color::WHITE);
    }

    #[test]
    fn duplicate_kind_is_a_registry_error() {
        let kinds: Vec<KindData> = ron::from_str(r#"[(name: "a"), (name: "a")]"#).unwrap();
        assert!(matches!(
            build_registry(&kinds, Path::new("kinds.ron")),
            Err(DataLoadError::Registry {
                source: RegistryError::DuplicateName(_),
                ..
            })
        ));
    }

    #[test]
    fn oversized_capacity_factor_is_invalid() {
        let kinds: Vec<KindData> =
            ron::from_str(r#"[(name: "a", capacity_factor: 5000000000.0)]"#).unwrap();
        assert!(matches!(
            build_registry(&kinds, Path::new("kinds.ron")),
            Err(DataLoadError::Invalid { .. })
        ));
    }

    #[test]
    fn negative_viscosity_is_invalid() {
        let kinds: Vec<KindData> = ron::from_str(r#"[(name: "a", viscosity: -1.0)]"#).unwrap();
        assert!(matches!(
            build_registry(&kinds, Path::new("kinds.ron")),
            Err(DataLoadError::Invalid { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Parts and system
    // -----------------------------------------------------------------------

    #[test]
    fn parts_resolve_against_registry() {
        let dir = make_test_dir("parts");
        fs::write(dir.join("kinds.ron"), KINDS_RON).unwrap();
        fs::write(
            dir.join("parts.ron"),
            r#"[
                (
                    name: "tank",
                    roles: [storage],
                    container: Some((capacity: 100.0, accepts: ["steam", "oil"])),
                    store_evenly: true,
                    footprint: (width: 2, height: 2),
                ),
                (name: "pipe", roles: [transmitter]),
                (
                    name: "inlet",
                    roles: [requester],
                    container: Some((capacity: 10.0, accepts: ["oil"])),
                    requester: Some((mode: manual, amounts: {"oil": 4.0})),
                ),
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.join("system.ron"),
            "(base_unit: 2.0, max_path_depth: Some(8), controller_families: [1])",
        )
        .unwrap();

        let data = load_flow_data(&dir).unwrap();
        let tank = data.part("tank").unwrap();
        assert!(tank.spec.roles.contains(Role::Storage));
        assert!(tank.spec.store_evenly);
        assert_eq!(tank.footprint, Footprint::new(2, 2));
        assert_eq!(tank.spec.container.as_ref().unwrap().accepted.len(), 2);
        assert_eq!(data.part("pipe").unwrap().spec.roles, RoleSet::TRANSMITTER);

        let oil = data.registry.kind_id("oil").unwrap();
        let inlet = data.part("inlet").unwrap().spec.requester.as_ref().unwrap();
        assert_eq!(inlet.requested.get(&oil), Some(&Fixed64::from_num(4)));

        assert_eq!(data.config.base_unit, Fixed64::from_num(2));
        assert_eq!(data.config.max_path_depth, Some(8));
        assert_eq!(data.controller_families, vec![NetworkFamilyId(1)]);
        assert_eq!(data.build_system().part_count(), 0);
        cleanup(&dir);
    }

    #[test]
    fn unknown_kind_reference_is_reported() {
        let registry = build_registry(
            &ron::from_str::<Vec<KindData>>(KINDS_RON).unwrap(),
            Path::new("kinds.ron"),
        )
        .unwrap();
        let parts: Vec<PartData> = ron::from_str(
            r#"[(name: "tank", roles: [storage], container: Some((capacity: 1.0, accepts: ["lava"])))]"#,
        )
        .unwrap();
        let err = resolve_parts(&parts, &registry, Path::new("parts.ron")).unwrap_err();
        assert!(matches!(err, DataLoadError::UnresolvedRef { ref name, .. } if name == "lava"));
    }

    #[test]
    fn duplicate_part_name_is_reported() {
        let registry = KindRegistryBuilder::new().build().unwrap();
        let parts: Vec<PartData> =
            ron::from_str(r#"[(name: "pipe", roles: [transmitter]), (name: "pipe", roles: [])]"#)
                .unwrap();
        assert!(matches!(
            resolve_parts(&parts, &registry, Path::new("parts.ron")),
            Err(DataLoadError::DuplicateName { .. })
        ));
    }
}
