//! Build complet d'un projet sur disque (charges `Source`), jusqu'au paquet.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use rap_deploy::prelude::*;
use rap_image::{ImageView, LayoutKind};

struct NoFlash;

impl Flasher for NoFlash {
    fn flash(&self, _: &Path, _: u32) -> rap_deploy::Result<()> {
        Err(DeployError::Flash("not connected".into()))
    }
}

fn project(root: &Path) -> Vec<ManifestEntry> {
    let files: [(&str, &[u8]); 4] = [
        ("package.json", br#"{"name":"weather"}"#),
        ("src/index.js", b"var dht = require('dht11');"),
        ("ruff_modules/dht11/lib/dht11.so", b"\x7fELF-dht"),
        ("ruff_modules/lcd/src/lcd.so", b"\x7fELF-lcd"),
    ];
    files
        .iter()
        .map(|(name, data)| {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, data).unwrap();
            ManifestEntry::from_source(*name, path)
        })
        .collect()
}

#[test]
fn source_project_to_compact_package() -> rap_deploy::Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let manifest = project(dir.path());
    let layout = LayoutConfig { origin: -1, ..LayoutConfig::default() };
    let config = BuildConfiguration::from_layout(&layout, false, None, true);
    let compiler = resolve_compiler(config.compile_scripts, &layout.compiler);

    let outcome = Deployer::new(dir.path(), &NoFlash).run(manifest, DeployMode::Package { path: None }, &config, compiler)?;
    let DeployOutcome::Packaged { path, summary } = outcome else { panic!("expected a package") };
    assert_eq!(path, dir.path().join("weather.bin"));
    assert_eq!(summary.compiler, "disabled");
    assert_eq!(summary.resources, ["package.json", "src/index.js"]);

    let view = ImageView::from_bytes(&fs::read(&path).unwrap())?;
    assert_eq!(view.kind, LayoutKind::Relative);
    assert!(view.compact);
    let modules: Vec<_> = view.modules.iter().map(|m| (m.name.as_str(), m.objects.len())).collect();
    assert_eq!(modules, [("dht11", 1), ("lcd", 1)]);
    assert_eq!(view.files[1].data, b"var dht = require('dht11');");
    Ok(())
}

#[test]
fn flash_failure_surfaces_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = project(dir.path());
    let err = Deployer::new(dir.path(), &NoFlash)
        .run(manifest, DeployMode::Flash, &BuildConfiguration { compile_scripts: false, ..Default::default() }, CompilerStatus::Disabled)
        .unwrap_err();
    assert_eq!(err.to_string(), "flash failed: not connected");
}

#[cfg(unix)]
#[test]
fn scripts_compiled_by_external_process() -> rap_deploy::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let manifest = project(dir.path());
    let bin = tempfile::tempdir().unwrap();
    let compiler = bin.path().join("ruff-compiler");
    fs::write(&compiler, "#!/bin/sh\nprintf 'RBC'; wc -c | tr -d ' '\n").unwrap();
    fs::set_permissions(&compiler, fs::Permissions::from_mode(0o755)).unwrap();

    let status = resolve_compiler(true, compiler.to_str().unwrap());
    let out = dir.path().join("out.bin");
    let outcome = Deployer::new(dir.path(), &NoFlash).run(
        manifest,
        DeployMode::Package { path: Some(out.clone()) },
        &BuildConfiguration { compile_scripts: true, origin_address: 0, compact: false },
        status,
    )?;
    assert_eq!(outcome.summary().compiled, 2);
    assert_eq!(outcome.summary().compiler, "available");

    let view = ImageView::from_bytes(&fs::read(&out).unwrap())?;
    assert!(view.files.iter().all(|f| f.data.starts_with(b"RBC")));
    Ok(())
}
