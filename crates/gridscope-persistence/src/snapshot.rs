//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gridscope_model::{Network, NetworkDocument};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{PersistenceError, Result};

/// Current snapshot envelope version.
pub const SNAPSHOT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u16,
    created_at: DateTime<Utc>,
    /// Version token the network carried when it was captured.
    network_version: u64,
    hash: String,
    network: NetworkDocument,
}

/// Summary of a snapshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Final location of the snapshot.
    pub path: PathBuf,
    /// Size of the encoded envelope in bytes.
    pub bytes: usize,
    /// Hex-encoded SHA-256 of the network payload.
    pub hash: String,
}

fn is_cbor(path: &Path) -> bool {
    matches!(path.extension().and_then(|ext| ext.to_str()), Some("cbor"))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Persist `network` to `path`, replacing any previous snapshot.
///
/// The serializer is selected based on file extension: `.cbor` writes CBOR,
/// all other extensions default to JSON. The envelope is written next to the
/// target and renamed into place, so readers never see a partial file.
pub fn save_snapshot(network: &Network, path: &Path) -> Result<SnapshotInfo> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut envelope = SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        created_at: Utc::now(),
        network_version: network.version().get(),
        hash: String::new(),
        network: network.document().clone(),
    };
    envelope.hash = compute_hash(&envelope.network)?;

    let bytes = if is_cbor(path) {
        serde_cbor::to_vec(&envelope).map_err(PersistenceError::from)?
    } else {
        serde_json::to_vec_pretty(&envelope)?
    };

    let staging = temp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }

    debug!(
        path = %path.display(),
        bytes = bytes.len(),
        network_id = %envelope.network.id,
        "network snapshot written"
    );
    Ok(SnapshotInfo {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        hash: envelope.hash,
    })
}

/// Load a snapshot from disk and return the stored network document.
pub fn load_snapshot(path: &Path) -> Result<NetworkDocument> {
    let envelope = load_envelope(path)?;
    if envelope.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(envelope.version));
    }
    let expected = compute_hash(&envelope.network)?;
    if envelope.hash != expected {
        return Err(PersistenceError::HashMismatch);
    }
    Ok(envelope.network)
}

/// Load a snapshot and rebuild it into a validated network with a fresh version.
pub fn restore_network(path: &Path) -> Result<Network> {
    let document = load_snapshot(path)?;
    Ok(Network::build(document)?)
}

/// Verify the integrity of a snapshot without rebuilding the network.
pub fn verify_snapshot(path: &Path) -> bool {
    match load_envelope(path) {
        Ok(envelope) => compute_hash(&envelope.network)
            .map(|hash| hash == envelope.hash)
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn load_envelope(path: &Path) -> Result<SnapshotEnvelope> {
    let bytes = fs::read(path)?;
    let envelope = if is_cbor(path) {
        serde_cbor::from_slice(&bytes).map_err(PersistenceError::from)?
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok(envelope)
}

fn compute_hash(network: &NetworkDocument) -> Result<String> {
    let serialized = serde_json::to_vec(network)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscope_model::parse;
    use tempfile::tempdir;

    const DOC: &str = r#"<network id="snap"><substation id="S1" country="FR">
        <voltageLevel id="VL1" nominalV="400"><busBreakerTopology><bus id="B1"/></busBreakerTopology>
            <generator id="G1" bus="B1"/>
        </voltageLevel>
        <voltageLevel id="VL2" nominalV="225"><busBreakerTopology><bus id="B2"/></busBreakerTopology></voltageLevel>
    </substation>
    <line id="L1" voltageLevelId1="VL1" bus1="B1" voltageLevelId2="VL2" bus2="B2"/>
    </network>"#;

    #[test]
    fn save_and_load_json_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        let network = parse(DOC.as_bytes()).unwrap();

        let info = save_snapshot(&network, &path).unwrap();
        assert_eq!(info.path, path);
        assert!(info.bytes > 0);
        assert!(verify_snapshot(&path));
        assert!(!temp_path(&path).exists());

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(&loaded, network.document());
    }

    #[test]
    fn save_and_load_cbor_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("network.cbor");
        let network = parse(DOC.as_bytes()).unwrap();

        save_snapshot(&network, &path).unwrap();
        assert!(verify_snapshot(&path));

        let restored = restore_network(&path).unwrap();
        assert_eq!(restored.document(), network.document());
        assert!(restored.version() > network.version());
    }

    #[test]
    fn overwrite_keeps_a_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        save_snapshot(&parse(DOC.as_bytes()).unwrap(), &path).unwrap();
        let second = parse(DOC.replace("snap", "snap-2").as_bytes()).unwrap();
        save_snapshot(&second, &path).unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(load_snapshot(&path).unwrap().id, "snap-2");
    }

    #[test]
    fn verify_rejects_tampered_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        save_snapshot(&parse(DOC.as_bytes()).unwrap(), &path).unwrap();

        // Tamper with the file by editing the payload.
        let mut envelope: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        envelope["network"]["substations"][0]["voltageLevels"][0]["nominalKv"] =
            serde_json::json!(380.0);
        fs::write(&path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        assert!(!verify_snapshot(&path));
        assert!(matches!(
            load_snapshot(&path),
            Err(PersistenceError::HashMismatch)
        ));
    }

    #[test]
    fn future_format_versions_are_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        save_snapshot(&parse(DOC.as_bytes()).unwrap(), &path).unwrap();

        let mut envelope: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        envelope["version"] = serde_json::json!(SNAPSHOT_VERSION + 1);
        fs::write(&path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        assert!(matches!(
            load_snapshot(&path),
            Err(PersistenceError::UnsupportedVersion(2))
        ));
    }
}
