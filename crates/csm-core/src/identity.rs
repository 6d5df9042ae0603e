// ── Hardware identity classification ──
//
// SLS reservations carry the owner's xname in a free-text `Comment`.
// Only node-class owners have BSS boot parameters; everything else
// (switches, BMCs, PDUs) exists only in SLS.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// The hardware type an xname denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[non_exhaustive]
pub enum HardwareKind {
    Cabinet,
    CabinetPduController,
    CabinetPdu,
    Cdu,
    CduMgmtSwitch,
    Chassis,
    ChassisBmc,
    ComputeModule,
    MgmtSwitch,
    MgmtHlSwitch,
    NodeBmc,
    Node,
    RouterModule,
    RouterBmc,
}

impl HardwareKind {
    /// Only nodes have boot parameter records.
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node)
    }
}

/// A validated, lower-cased hardware identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xname {
    value: String,
    kind: HardwareKind,
}

impl Xname {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> HardwareKind {
        self.kind
    }

    pub fn is_node(&self) -> bool {
        self.kind.is_node()
    }
}

impl fmt::Display for Xname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl std::str::FromStr for Xname {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        XNAME_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(&value))
            .map(|(kind, _)| Self { value, kind: *kind })
            .ok_or_else(|| CoreError::UnknownIdentity { owner: s.into() })
    }
}

static XNAME_PATTERNS: LazyLock<Vec<(HardwareKind, Regex)>> = LazyLock::new(|| {
    [
        (HardwareKind::Cabinet, r"^x\d{1,4}$"),
        (HardwareKind::CabinetPduController, r"^x\d{1,4}m\d+$"),
        (HardwareKind::CabinetPdu, r"^x\d{1,4}m\d+p\d+$"),
        (HardwareKind::Cdu, r"^d\d+$"),
        (HardwareKind::CduMgmtSwitch, r"^d\d+w\d+$"),
        (HardwareKind::Chassis, r"^x\d{1,4}c\d+$"),
        (HardwareKind::ChassisBmc, r"^x\d{1,4}c\d+b\d+$"),
        (HardwareKind::ComputeModule, r"^x\d{1,4}c\d+s\d+$"),
        (HardwareKind::MgmtSwitch, r"^x\d{1,4}c\d+w\d+$"),
        (HardwareKind::MgmtHlSwitch, r"^x\d{1,4}c\d+h\d+s\d+$"),
        (HardwareKind::NodeBmc, r"^x\d{1,4}c\d+s\d+b\d+$"),
        (HardwareKind::Node, r"^x\d{1,4}c\d+s\d+b\d+n\d+$"),
        (HardwareKind::RouterModule, r"^x\d{1,4}c\d+r\d+$"),
        (HardwareKind::RouterBmc, r"^x\d{1,4}c\d+r\d+b\d+$"),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        #[allow(clippy::expect_used)]
        let re = Regex::new(pattern).expect("static xname pattern");
        (kind, re)
    })
    .collect()
});

/// Resolves a reservation owner tag to a typed hardware identifier.
pub trait IdentityClassifier {
    fn classify(&self, owner: &str) -> Result<Xname, CoreError>;
}

/// Classifier for CSM owner tags: the first whitespace- or
/// comma-separated token that parses as an xname wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct XnameClassifier;

impl IdentityClassifier for XnameClassifier {
    fn classify(&self, owner: &str) -> Result<Xname, CoreError> {
        owner
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|token| !token.is_empty())
            .find_map(|token| token.parse::<Xname>().ok())
            .ok_or_else(|| CoreError::UnknownIdentity {
                owner: owner.into(),
            })
    }
}
