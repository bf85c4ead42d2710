use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Store backend kinds
///
/// Every named store bound to an attachment type is one of these kinds.
/// It's defined in core because it's used in configuration and by the storage crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Files on a local filesystem under a partitioned path
    FileSystem,
    /// Bytes held in a database blob row referenced by `db_file_id`
    DbFile,
    /// Objects in a remote object store (S3 and compatible)
    Remote,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file_system" | "filesystem" | "fs" => Ok(StoreKind::FileSystem),
            "db_file" | "blob" => Ok(StoreKind::DbFile),
            "remote" | "s3" => Ok(StoreKind::Remote),
            _ => Err(anyhow::anyhow!("Invalid store kind: {}", s)),
        }
    }
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StoreKind::FileSystem => write!(f, "file_system"),
            StoreKind::DbFile => write!(f, "db_file"),
            StoreKind::Remote => write!(f, "remote"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_aliases() {
        assert_eq!("fs".parse::<StoreKind>().unwrap(), StoreKind::FileSystem);
        assert_eq!("S3".parse::<StoreKind>().unwrap(), StoreKind::Remote);
        assert_eq!("blob".parse::<StoreKind>().unwrap(), StoreKind::DbFile);
        assert!("nfs".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_store_kind_display_round_trips() {
        for kind in [StoreKind::FileSystem, StoreKind::DbFile, StoreKind::Remote] {
            assert_eq!(kind.to_string().parse::<StoreKind>().unwrap(), kind);
        }
    }
}
