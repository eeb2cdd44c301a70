use std::fmt;
use std::str::FromStr;

use nsm_types::Status;

pub const LOCAL_DOMAIN: &str = "local";

/// Address of a single cell: `name@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    cell: String,
    domain: String,
}

impl CellAddress {
    pub fn new(cell: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            cell: cell.into(),
            domain: domain.into(),
        }
    }

    /// An address in the local domain.
    pub fn local(cell: impl Into<String>) -> Self {
        Self::new(cell, LOCAL_DOMAIN)
    }

    pub fn cell(&self) -> &str {
        &self.cell
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cell, self.domain)
    }
}

impl FromStr for CellAddress {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cell, domain) = match s.split_once('@') {
            Some((cell, domain)) => (cell, domain),
            None => (s, LOCAL_DOMAIN),
        };
        if cell.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Status::invalid_arg(format!("invalid cell address: {}", s)));
        }
        Ok(Self::new(cell, domain))
    }
}

/// Ordered list of hops. The last hop is the final target.
///
/// A request's source path records the hops it travelled through, so the
/// reverted source path leads back to the requester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellPath {
    hops: Vec<CellAddress>,
}

impl CellPath {
    pub fn new(target: CellAddress) -> Self {
        Self { hops: vec![target] }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_hops(hops: Vec<CellAddress>) -> Self {
        Self { hops }
    }

    pub fn add(&mut self, hop: CellAddress) {
        self.hops.push(hop);
    }

    /// The final destination of this path.
    pub fn target(&self) -> Option<&CellAddress> {
        self.hops.last()
    }

    pub fn hops(&self) -> &[CellAddress] {
        &self.hops
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// The path leading back the way this one came.
    pub fn revert(&self) -> Self {
        let mut hops = self.hops.clone();
        hops.reverse();
        Self { hops }
    }
}

impl From<CellAddress> for CellPath {
    fn from(address: CellAddress) -> Self {
        Self::new(address)
    }
}

impl FromStr for CellPath {
    type Err = Status;

    /// Parses `a@d1:b@d2`, hops separated by `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hops = s
            .split(':')
            .map(CellAddress::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { hops })
    }
}

impl fmt::Display for CellPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}", hop)?;
        }
        f.write_str("]")
    }
}
