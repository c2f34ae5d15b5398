use anyhow::{Result, anyhow};
use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot locate home directory"))?
        .home_dir()
        .to_path_buf();
    let dir = home.join(".local").join("run");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("signctl.sock"))
}
