//! Plans shipped with the crate.

const PRESETS: &[(&str, &str)] = &[
    ("gitignore-env", include_str!("../presets/gitignore-env.yaml")),
    ("remote-https", include_str!("../presets/remote-https.yaml")),
    ("rename-docs", include_str!("../presets/rename-docs.yaml")),
];

/// Returns the source of an embedded preset.
#[must_use]
pub fn get(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, source)| *source)
}

/// Names of every embedded preset.
#[must_use]
pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}
