use std::path::Path;

use reclaim_core::ReclaimConfig;

pub fn init(path: &str, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path).join("reclaim.toml");
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::write(&output, ReclaimConfig::scaffold().to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_scaffold_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        init(path, false).unwrap();
        let written = ReclaimConfig::from_file(&dir.path().join("reclaim.toml")).unwrap();
        assert_eq!(written.usage().policy.as_deref(), Some("any-zero"));

        assert!(init(path, false).is_err());
        assert!(init(path, true).is_ok());
    }
}
