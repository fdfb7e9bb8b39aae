//! Built-in vocabulary for directory and local-machine collection.

use super::edges::{EdgeKindSpec, EdgeTag};
use super::{Cardinality, Registry};
use crate::probability::Calculator;
use crate::Result;

pub const OBJECT_SID: &str = "objectSid";
pub const DISTINGUISHED_NAME: &str = "distinguishedName";
pub const NAME: &str = "name";
pub const OBJECT_TYPE: &str = "objectType";
pub const LOCAL_MACHINE_SID: &str = "localMachineSID";
pub const LOCAL_MACHINE_SID_ORIGINAL: &str = "localMachineSIDOriginal";
pub const DNS_HOSTNAME: &str = "dnsHostName";

pub const EDGE_SID_COLLISION: &str = "SIDCollision";

/// Attributes whose text values are parsed as SIDs on import.
pub const SID_ATTRIBUTES: &[&str] = &[OBJECT_SID, LOCAL_MACHINE_SID, LOCAL_MACHINE_SID_ORIGINAL];

const ATTRIBUTES: &[(&str, Cardinality)] = &[
    (OBJECT_SID, Cardinality::Single),
    (DISTINGUISHED_NAME, Cardinality::Single),
    (NAME, Cardinality::Single),
    (OBJECT_TYPE, Cardinality::Single),
    (LOCAL_MACHINE_SID, Cardinality::Single),
    (LOCAL_MACHINE_SID_ORIGINAL, Cardinality::Single),
    ("absolutePath", Cardinality::Single),
    ("shareType", Cardinality::Single),
    ("serviceStart", Cardinality::Single),
    ("serviceType", Cardinality::Single),
    (DNS_HOSTNAME, Cardinality::Single),
    ("wuServer", Cardinality::Multi),
    ("sccmServer", Cardinality::Multi),
    ("lastLogon", Cardinality::Single),
];

fn edge_kinds() -> Vec<EdgeKindSpec> {
    use EdgeTag::*;
    let e = |name: &str| EdgeKindSpec::new(name);
    let fixed = Calculator::fixed;

    vec![
        e("AdminRights").tag(Granted),
        // Exposure to broad interactive principals would raise this, but
        // finding that out means evaluating the neighbouring edges.
        e("RDPRights").calculator(fixed(30)).tag(Granted).tag(Pivot),
        e("DCOMRights").calculator(fixed(50)).tag(Granted),
        e("SMSAdmins").calculator(fixed(50)).tag(Granted),
        e("SessionLastDay").calculator(fixed(80)).tag(Pivot),
        e("SessionLastWeek").calculator(fixed(55)).tag(Pivot),
        e("SessionLastMonth").calculator(fixed(30)).tag(Pivot),
        e("SvcAccntCreds").tag(Pivot),
        e("AutoAdminLogonCreds").tag(Pivot),
        e("RunsExecutable"),
        e("Hosts"),
        e("Executed"),
        e("MemberOfGroup"),
        e("FileWrite"),
        e("FileRead"),
        e("Shares").describe("Machine offers a file share"),
        e("RegistryOwns"),
        e("RegistryWrite"),
        e("RegistryModifyDACL"),
        e("RegistryModifyOwner"),
        e("SeBackupPrivilege"),
        e("SeRestorePrivilege"),
        e("SeTakeOwnershipPrivilege"),
        e("SeAssignPrimaryToken").tag(Pivot),
        e("SeCreateToken").tag(Pivot),
        e("SeDebug").tag(Pivot),
        e("SeImpersonate").calculator(fixed(20)).tag(Pivot),
        e("SeLoadDriver").tag(Pivot),
        e("SeManageVolume").tag(Pivot),
        e("SeTakeOwnership").tag(Pivot),
        e("SeTrustedCredManAccess").tag(Pivot),
        e("SeTcb").tag(Pivot),
        e("SeNetworkLogonRight").calculator(fixed(10)),
        e(EDGE_SID_COLLISION).tag(Informative).calculator(fixed(0)),
        e("ControlsUpdates").tag(Affects),
        e("Publishes").tag(Informative),
    ]
}

/// Register the built-in attributes and edge kinds. Idempotent.
pub(crate) fn register(registry: &Registry) -> Result<()> {
    for (name, cardinality) in ATTRIBUTES {
        registry.attributes.register_with(name, *cardinality)?;
    }
    for spec in edge_kinds() {
        registry.edges.register(spec)?;
    }
    tracing::debug!(
        attributes = registry.attributes.len(),
        edge_kinds = registry.edges.len(),
        "default vocabulary registered"
    );
    Ok(())
}
