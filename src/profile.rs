use crate::error::Error;
use parking_lot::RwLock;
use std::env;
use std::fs;
use std::path::PathBuf;

lazy_static! {
    static ref CURRENT: RwLock<Option<Profile>> = RwLock::new(None);
}

pub const DATABASE_FILE: &str = "directory.sqlite";

///
/// Where the directory keeps its data
///
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    /// `$NOSTR_DIRECTORY_DIR`, or `nostr-directory` under the platform data directory
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl Profile {
    fn new() -> Result<Profile, Error> {
        let data_dir = match env::var("NOSTR_DIRECTORY_DIR") {
            Ok(dir) => {
                tracing::info!("Using NOSTR_DIRECTORY_DIR: {}", dir);
                PathBuf::from(dir)
            }
            Err(_) => {
                let mut data_dir = dirs::data_dir()
                    .ok_or::<Error>("Cannot find a directory to store application data.".into())?;
                data_dir.push("nostr-directory");
                data_dir
            }
        };

        fs::create_dir_all(&data_dir)?;

        let mut database_path = data_dir.clone();
        database_path.push(DATABASE_FILE);

        Ok(Profile {
            data_dir,
            database_path,
        })
    }

    pub fn current() -> Result<Profile, Error> {
        if let Some(profile) = CURRENT.read().as_ref() {
            return Ok(profile.clone());
        }
        let created = Profile::new()?;
        *CURRENT.write() = Some(created.clone());
        Ok(created)
    }
}
