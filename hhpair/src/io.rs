use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use libhhpair::structs::{Profile, ProfileData};
use serde::Deserialize;

/// A profile file holds either a single profile or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileFile {
    Single(ProfileData),
    Many(Vec<ProfileData>),
}

pub fn read_profiles(path: impl AsRef<Path>) -> anyhow::Result<Vec<Profile>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open profile file: {}", path.to_string_lossy()))?;

    let data: ProfileFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse profile file: {}", path.to_string_lossy()))?;

    let data = match data {
        ProfileFile::Single(data) => vec![data],
        ProfileFile::Many(data) => data,
    };

    data.into_iter()
        .map(|data| {
            let name = data.name.clone();
            Profile::new(data).with_context(|| {
                format!(
                    "invalid profile {name} in file: {}",
                    path.to_string_lossy()
                )
            })
        })
        .collect()
}
