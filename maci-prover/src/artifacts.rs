//! Proving artifact manifest.
//!
//! `manifest.json` sits next to the artifacts it describes and records, per
//! circuit, the witness generator and zkey with their blake3 digest and
//! size. Loading re-hashes every file so a truncated download or a swapped
//! zkey is caught before any proof is attempted.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProverError;

pub const MANIFEST_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Circuit {
    ProcessMessages,
    TallyVotes,
}

impl Circuit {
    pub fn name(&self) -> &'static str {
        match self {
            Circuit::ProcessMessages => "processMessages",
            Circuit::TallyVotes => "tallyVotes",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Circuit {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processMessages" | "process-messages" | "process" => Ok(Circuit::ProcessMessages),
            "tallyVotes" | "tally-votes" | "tally" => Ok(Circuit::TallyVotes),
            other => Err(ProverError::InvalidInput(format!("unknown circuit {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: hash_bytes_hex(bytes),
            size: bytes.len() as u64,
        }
    }

    fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitArtifacts {
    pub witness_generator: ArtifactFile,
    pub zkey: ArtifactFile,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub created_at_unix: u64,
    /// Prover executable, resolved through `PATH` when not absolute.
    pub prover_binary: String,
    pub process_messages: CircuitArtifacts,
    pub tally_votes: CircuitArtifacts,
}

impl ArtifactManifest {
    pub fn circuit(&self, circuit: Circuit) -> &CircuitArtifacts {
        match circuit {
            Circuit::ProcessMessages => &self.process_messages,
            Circuit::TallyVotes => &self.tally_votes,
        }
    }
}

/// Absolute locations of a manifest's verified artifacts.
#[derive(Clone, Debug)]
pub struct VerifiedArtifacts {
    pub manifest: ArtifactManifest,
    pub base_dir: PathBuf,
}

impl VerifiedArtifacts {
    pub fn witness_generator(&self, circuit: Circuit) -> PathBuf {
        self.manifest
            .circuit(circuit)
            .witness_generator
            .resolve_path(&self.base_dir)
    }

    pub fn zkey(&self, circuit: Circuit) -> PathBuf {
        self.manifest.circuit(circuit).zkey.resolve_path(&self.base_dir)
    }

    pub fn prover_binary(&self) -> PathBuf {
        let configured = PathBuf::from(&self.manifest.prover_binary);
        if configured.components().count() > 1 {
            self.base_dir.join(configured)
        } else {
            configured
        }
    }
}

pub fn write_manifest(path: impl AsRef<Path>, manifest: &ArtifactManifest) -> Result<(), ProverError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    fs::write(path.as_ref(), json)?;
    Ok(())
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<ArtifactManifest, ProverError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ProverError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ProverError::Artifact(format!("failed to parse manifest json: {err}")))
}

/// Read the manifest and check every artifact's size and digest.
pub fn load_artifacts(manifest_path: impl AsRef<Path>) -> Result<VerifiedArtifacts, ProverError> {
    let manifest_path = manifest_path.as_ref();
    let manifest = read_manifest(manifest_path)?;
    ensure_manifest_compat(&manifest)?;
    let base_dir = manifest_dir(manifest_path);

    for circuit in [Circuit::ProcessMessages, Circuit::TallyVotes] {
        let entry = manifest.circuit(circuit);
        verify_artifact_file(&base_dir, &entry.witness_generator, circuit, "witness generator")?;
        verify_artifact_file(&base_dir, &entry.zkey, circuit, "zkey")?;
    }

    Ok(VerifiedArtifacts { manifest, base_dir })
}

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn verify_artifact_file(
    base_dir: &Path,
    entry: &ArtifactFile,
    circuit: Circuit,
    label: &str,
) -> Result<(), ProverError> {
    let path = entry.resolve_path(base_dir);
    let bytes = fs::read(&path).map_err(|source| ProverError::ArtifactIo {
        path: path.clone(),
        source,
    })?;
    if bytes.len() as u64 != entry.size {
        return Err(ProverError::Artifact(format!(
            "{circuit} {label} size mismatch, manifest recorded {} bytes but found {}",
            entry.size,
            bytes.len()
        )));
    }
    let actual = hash_bytes_hex(&bytes);
    if actual != entry.blake3 {
        return Err(ProverError::Artifact(format!(
            "{circuit} {label} hash mismatch, expected {} but computed {actual}",
            entry.blake3
        )));
    }
    debug!(%circuit, label, path = %path.display(), "verified artifact");
    Ok(())
}

fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn ensure_manifest_compat(manifest: &ArtifactManifest) -> Result<(), ProverError> {
    if manifest.manifest_version != MANIFEST_VERSION {
        return Err(ProverError::Artifact(format!(
            "unsupported manifest version {}, expected {}",
            manifest.manifest_version, MANIFEST_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifacts(dir: &Path) -> ArtifactManifest {
        let mut entries = Vec::new();
        for name in ["pm_witness", "pm.zkey", "tv_witness", "tv.zkey"] {
            let bytes = format!("contents of {name}").into_bytes();
            fs::write(dir.join(name), &bytes).unwrap();
            entries.push(ArtifactFile::from_bytes(name, &bytes));
        }
        let manifest = ArtifactManifest {
            manifest_version: MANIFEST_VERSION,
            created_at_unix: 1_700_000_000,
            prover_binary: "rapidsnark".into(),
            process_messages: CircuitArtifacts {
                witness_generator: entries[0].clone(),
                zkey: entries[1].clone(),
            },
            tally_votes: CircuitArtifacts {
                witness_generator: entries[2].clone(),
                zkey: entries[3].clone(),
            },
        };
        write_manifest(dir.join(MANIFEST_FILE), &manifest).unwrap();
        manifest
    }

    #[test]
    fn loads_intact_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_artifacts(dir.path());
        let loaded = load_artifacts(dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(loaded.manifest, manifest);
        assert_eq!(
            loaded.zkey(Circuit::TallyVotes),
            dir.path().join("tv.zkey")
        );
        assert_eq!(loaded.prover_binary(), PathBuf::from("rapidsnark"));
    }

    #[test]
    fn detects_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        // Same length, different bytes.
        fs::write(dir.path().join("pm.zkey"), b"contents of pm.zkez").unwrap();
        let err = load_artifacts(dir.path().join(MANIFEST_FILE)).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"), "{err}");
    }

    #[test]
    fn detects_missing_and_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        fs::write(dir.path().join("tv.zkey"), b"short").unwrap();
        let err = load_artifacts(dir.path().join(MANIFEST_FILE)).unwrap_err();
        assert!(err.to_string().contains("size mismatch"), "{err}");

        fs::remove_file(dir.path().join("tv_witness")).unwrap();
        assert!(matches!(
            load_artifacts(dir.path().join(MANIFEST_FILE)),
            Err(ProverError::ArtifactIo { .. })
        ));
    }

    #[test]
    fn circuit_names_parse() {
        assert_eq!("process".parse::<Circuit>().unwrap(), Circuit::ProcessMessages);
        assert_eq!("tallyVotes".parse::<Circuit>().unwrap(), Circuit::TallyVotes);
        assert!("subsidy".parse::<Circuit>().is_err());
    }
}
