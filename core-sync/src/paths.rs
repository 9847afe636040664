//! # Local Content Probe
//!
//! Resolves where a skin lives on disk and reports what is actually there.
//!
//! ## Layouts
//!
//! ```text
//! ac   {root}/{car}/                      container (the base car, must exist)
//!      {root}/{car}/skins/                extraction target
//!      {root}/{car}/skins/{skin}/         installed item
//!
//! acc  {root}/Customs/Cars/{skin}.json    container (car definition)
//!      {root}/                            extraction target
//!      {root}/Customs/Liveries/{skin}/    installed item
//! ```
//!
//! An acc package ships its own definition file, so the container is
//! reported but never required before a download.

use bridge_traits::{Category, SkinId};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CUSTOMS_DIR: &str = "Customs";
pub const CARS_DIR: &str = "Cars";
pub const LIVERIES_DIR: &str = "Liveries";
const AC_SKINS_DIR: &str = "skins";

/// Derived location triple for one skin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    pub category: Category,
    /// Parent the item depends on (car folder, or definition file)
    pub container: PathBuf,
    /// Directory the package is unpacked into
    pub extract_target: PathBuf,
    /// Directory that exists once the skin is installed
    pub item_path: PathBuf,
}

/// Existence facts gathered by [`LocalPaths::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalFacts {
    pub parent_present: bool,
    pub item_present: bool,
    /// Modification time of the installed item directory
    pub modified_at: Option<DateTime<Utc>>,
}

impl LocalPaths {
    pub fn resolve(root: &Path, id: &SkinId) -> Self {
        match id.category {
            Category::Ac => {
                let container = root.join(&id.content);
                let extract_target = container.join(AC_SKINS_DIR);
                let item_path = extract_target.join(&id.name);
                Self {
                    category: id.category,
                    container,
                    extract_target,
                    item_path,
                }
            }
            Category::Acc => {
                let customs = root.join(CUSTOMS_DIR);
                Self {
                    category: id.category,
                    container: customs.join(CARS_DIR).join(format!("{}.json", id.name)),
                    extract_target: root.to_path_buf(),
                    item_path: customs.join(LIVERIES_DIR).join(&id.name),
                }
            }
        }
    }

    pub fn parent_present(&self) -> bool {
        match self.category {
            Category::Ac => self.container.is_dir(),
            Category::Acc => self.container.is_file(),
        }
    }

    pub fn item_present(&self) -> bool {
        self.item_path.is_dir()
    }

    /// Reads the current on-disk facts.
    pub fn probe(&self) -> LocalFacts {
        let item_present = self.item_present();
        let modified_at = if item_present {
            std::fs::metadata(&self.item_path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .ok()
        } else {
            None
        };

        LocalFacts {
            parent_present: self.parent_present(),
            item_present,
            modified_at,
        }
    }

    /// Directory that holds the staging copy during extraction.
    ///
    /// Sits on the same filesystem as the item so the final move is a rename.
    /// For ac this is the car folder, keeping `skins/` free of staging dirs.
    pub fn staging_parent(&self) -> &Path {
        match self.category {
            Category::Ac => &self.container,
            Category::Acc => &self.extract_target,
        }
    }

    /// Where the item lands when the package is unpacked into `staging`.
    pub fn staged_item(&self, staging: &Path) -> Option<PathBuf> {
        self.staged(staging, &self.item_path)
    }

    /// Where an acc package's own definition file lands in `staging`.
    pub fn staged_definition(&self, staging: &Path) -> Option<PathBuf> {
        match self.category {
            Category::Ac => None,
            Category::Acc => self.staged(staging, &self.container),
        }
    }

    fn staged(&self, staging: &Path, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.extract_target)
            .ok()
            .map(|relative| staging.join(relative))
    }
}

/// Removes a file or directory tree, tolerating absence.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ac_layout() {
        let id = SkinId::new(Category::Ac, "7", "ks_porsche_911_gt3_r", "team_a");
        let paths = LocalPaths::resolve(Path::new("/ac/content/cars"), &id);

        assert_eq!(paths.container, Path::new("/ac/content/cars/ks_porsche_911_gt3_r"));
        assert_eq!(
            paths.extract_target,
            Path::new("/ac/content/cars/ks_porsche_911_gt3_r/skins")
        );
        assert_eq!(
            paths.item_path,
            Path::new("/ac/content/cars/ks_porsche_911_gt3_r/skins/team_a")
        );
    }

    #[test]
    fn test_acc_layout() {
        let id = SkinId::new(Category::Acc, "7", "porsche_991ii_gt3_r", "team_a");
        let paths = LocalPaths::resolve(Path::new("/docs/acc"), &id);

        assert_eq!(paths.container, Path::new("/docs/acc/Customs/Cars/team_a.json"));
        assert_eq!(paths.extract_target, Path::new("/docs/acc"));
        assert_eq!(paths.item_path, Path::new("/docs/acc/Customs/Liveries/team_a"));
    }

    #[test]
    fn test_probe_ac() {
        let root = tempdir().unwrap();
        let id = SkinId::new(Category::Ac, "1", "car", "skin");
        let paths = LocalPaths::resolve(root.path(), &id);

        assert_eq!(paths.probe(), LocalFacts::default());

        std::fs::create_dir_all(&paths.container).unwrap();
        let facts = paths.probe();
        assert!(facts.parent_present);
        assert!(!facts.item_present);

        std::fs::create_dir_all(&paths.item_path).unwrap();
        let facts = paths.probe();
        assert!(facts.item_present);
        assert!(facts.modified_at.is_some());
    }

    #[test]
    fn test_probe_acc_container_must_be_file() {
        let root = tempdir().unwrap();
        let id = SkinId::new(Category::Acc, "1", "car", "skin");
        let paths = LocalPaths::resolve(root.path(), &id);

        std::fs::create_dir_all(&paths.container).unwrap();
        assert!(!paths.parent_present());

        std::fs::remove_dir(&paths.container).unwrap();
        std::fs::write(&paths.container, b"{}").unwrap();
        assert!(paths.parent_present());
    }

    #[test]
    fn test_staged_locations() {
        let staging = Path::new("/games/ac/ks_porsche/.skin-1");
        let id = SkinId::new(Category::Ac, "1", "ks_porsche", "team_a");
        let ac = LocalPaths::resolve(Path::new("/games/ac"), &id);
        assert_eq!(ac.staging_parent(), Path::new("/games/ac/ks_porsche"));
        assert_eq!(ac.staged_item(staging), Some(staging.join("team_a")));
        assert_eq!(ac.staged_definition(staging), None);

        let staging = Path::new("/docs/acc/.skin-2");
        let id = SkinId::new(Category::Acc, "1", "bmw", "team_b");
        let acc = LocalPaths::resolve(Path::new("/docs/acc"), &id);
        assert_eq!(acc.staging_parent(), Path::new("/docs/acc"));
        assert_eq!(
            acc.staged_item(staging),
            Some(staging.join("Customs/Liveries/team_b"))
        );
        assert_eq!(
            acc.staged_definition(staging),
            Some(staging.join("Customs/Cars/team_b.json"))
        );
    }

    #[test]
    fn test_remove_path_tolerates_missing() {
        let root = tempdir().unwrap();
        let id = SkinId::new(Category::Acc, "1", "car", "skin");
        let paths = LocalPaths::resolve(root.path(), &id);

        remove_path(&paths.item_path).unwrap();

        std::fs::create_dir_all(paths.item_path.join("sub")).unwrap();
        std::fs::create_dir_all(paths.container.parent().unwrap()).unwrap();
        std::fs::write(&paths.container, b"{}").unwrap();

        remove_path(&paths.item_path).unwrap();
        remove_path(&paths.container).unwrap();
        assert!(!paths.item_path.exists());
        assert!(!paths.container.exists());
    }
}
