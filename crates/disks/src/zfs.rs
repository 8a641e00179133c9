//! The zsys-style dataset tree a `ZFS`/`ZFS_LUKS_KEYSTORE` guided scenario builds on top of a
//! root (`rpool`) partition. Grounded in the fixed layout `guided_zfs` constructs in
//! `original_source/subiquity/server/controllers/filesystem.py`; there is no teacher analog
//! (`distinst` predates zsys), so this module follows the original source's dataset names and
//! mount hierarchy directly rather than adapting an existing `distinst` type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ZFS dataset in the tree, identified by its full path (e.g. `rpool/ROOT/ubuntu_ab12cd`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub mount_point: Option<String>,
    /// `canmount=on` in zsys terms; `false` means the dataset exists purely for inheritance.
    pub canmount: bool,
}

impl Dataset {
    fn mounted(name: impl Into<String>, mount_point: impl Into<String>) -> Dataset {
        Dataset { name: name.into(), mount_point: Some(mount_point.into()), canmount: true }
    }

    fn unmounted(name: impl Into<String>) -> Dataset {
        Dataset { name: name.into(), mount_point: None, canmount: false }
    }
}

/// The root of one ZFS pool's dataset tree (`bpool` or `rpool`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZfsPool {
    pub name: String,
    pub datasets: Vec<Dataset>,
}

/// The fixed set of children under `ROOT/ubuntu_<u1>`, mirroring the original's enumerated list.
const ROOT_CHILDREN: &[&str] = &[
    "var", "var/lib", "var/lib/AccountsService", "var/lib/apt", "var/lib/dpkg",
    "var/lib/NetworkManager", "var/games", "var/log", "var/mail", "var/snap", "var/spool",
    "var/www", "srv", "usr/local",
];

/// Builds the standard `rpool` dataset tree for a fresh guided ZFS install.
///
/// `root_id`/`userdata_id` are the two generated zsys UUIDs the scenario assigns: one names the
/// `ROOT/ubuntu_<root_id>` system dataset and its descendants, the other names the
/// `USERDATA/{root,home}_<userdata_id>` home datasets.
pub fn guided_rpool(root_id: Uuid, userdata_id: Uuid) -> ZfsPool {
    let root_suffix = short_id(root_id);
    let userdata_suffix = short_id(userdata_id);
    let root_name = format!("ROOT/ubuntu_{}", root_suffix);

    let mut datasets = vec![
        Dataset::unmounted("ROOT"),
        Dataset::mounted(root_name.clone(), "/"),
        Dataset::unmounted("USERDATA"),
        Dataset::mounted(format!("USERDATA/root_{}", userdata_suffix), "/root"),
        Dataset::mounted(format!("USERDATA/home_{}", userdata_suffix), "/home"),
    ];

    for child in ROOT_CHILDREN {
        datasets.push(Dataset::mounted(format!("{}/{}", root_name, child), format!("/{}", child)));
    }

    ZfsPool { name: "rpool".into(), datasets }
}

/// The `bpool` tree is a single mounted dataset at `/boot`; no descendants.
pub fn guided_bpool() -> ZfsPool {
    ZfsPool { name: "bpool".into(), datasets: vec![Dataset::mounted("BOOT", "/boot")] }
}

/// zsys encodes its generated dataset suffixes as short lowercase hex, not a full UUID string.
fn short_id(id: Uuid) -> String {
    id.as_simple().to_string()[..6].to_string()
}
