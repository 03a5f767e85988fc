//! Builders for on-disk test installations

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Fixed modification time written into generated listings.
pub const MTIME: u64 = 1_545_393_012;

/// Write `files` as the catalog pair `<dir>/<stem>.cat` + `<stem>.dat`.
pub fn write_catalog(dir: &Path, stem: &str, files: &[(&str, &[u8])]) {
    std::fs::create_dir_all(dir).expect("create catalog dir");

    let mut listing = String::new();
    let mut blob = Vec::new();
    for (path, content) in files {
        let digest = hex::encode(md5::compute(content).0);
        listing.push_str(&format!("{path} {} {MTIME} {digest}\n", content.len()));
        blob.extend_from_slice(content);
    }

    std::fs::write(dir.join(format!("{stem}.cat")), listing).expect("write listing");
    std::fs::write(dir.join(format!("{stem}.dat")), blob).expect("write blob");
}

/// Write a single loose file, creating parent directories.
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
}

/// Render an `<index>` document.
pub fn index_document(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<index>\n");
    for (name, value) in entries {
        xml.push_str(&format!("  <entry name=\"{name}\" value=\"{value}\" />\n"));
    }
    xml.push_str("</index>\n");
    xml
}

/// A throwaway installation directory.
pub struct Install {
    dir: TempDir,
}

impl Install {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn extension_dir(&self, name: &str) -> PathBuf {
        self.root().join("extensions").join(name)
    }

    pub fn catalog(&self, stem: &str, files: &[(&str, &[u8])]) -> &Self {
        write_catalog(self.root(), stem, files);
        self
    }

    pub fn loose(&self, path: &str, content: &[u8]) -> &Self {
        write_file(&self.root().join(path), content);
        self
    }

    /// Add an extension with a manifest, optional dependencies and packed files.
    pub fn extension(
        &self,
        name: &str,
        dependencies: &[&str],
        files: &[(&str, &[u8])],
    ) -> &Self {
        let dir = self.extension_dir(name);
        let mut manifest = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<content id=\"{name}\" name=\"{name}\" version=\"100\" enabled=\"1\">\n"
        );
        for dependency in dependencies {
            manifest.push_str(&format!("  <dependency id=\"{dependency}\" />\n"));
        }
        manifest.push_str("</content>\n");
        write_file(&dir.join("content.xml"), manifest.as_bytes());

        if !files.is_empty() {
            write_catalog(&dir, "ext_01", files);
        }
        self
    }

    pub fn extension_loose(&self, name: &str, path: &str, content: &[u8]) -> &Self {
        write_file(&self.extension_dir(name).join(path), content);
        self
    }
}

pub const FOO_MACRO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="foo_macro" class="effectobject">
    <component ref="foo_component" />
    <properties>
      <identification name="Foo" />
    </properties>
  </macro>
</macros>
"#;

pub const BAZ_MACRO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="baz_macro" class="effectobject">
    <component ref="baz_component" />
  </macro>
</macros>
"#;

pub const SPACED_CONTENT: &[u8] = b"a file whose name has spaces\n";

/// A base installation: two vanilla pairs, a loose version marker and the
/// macro index with its target.
pub fn vanilla_install() -> Install {
    let install = Install::new();
    let index = index_document(&[
        ("foo_macro", r"assets\fx\macros\foo_macro"),
        ("shadowed_macro", r"assets\fx\macros\old_macro"),
    ]);
    install
        .catalog(
            "01",
            &[
                ("index/macros.xml", index.as_bytes()),
                ("assets/fx/macros/foo_macro.xml", FOO_MACRO.as_bytes()),
                ("libraries/wares.xml", b"<wares version=\"1\"/>"),
                ("libraries/with space/file with spaces.txt", SPACED_CONTENT),
                ("t/0001-l044.xml", b"<language id=\"44\"/>"),
            ],
        )
        .catalog(
            "02",
            &[
                ("libraries/wares.xml", b"<wares version=\"2\"/>"),
                ("libraries/empty.xml", b""),
            ],
        )
        .loose("version.dat", b"330\n");
    install
}

/// The base installation plus one extension overriding wares, adding a
/// macro through an index diff and shipping a loose-only file.
pub fn modded_install() -> Install {
    let install = vanilla_install();
    let diff = r#"<?xml version="1.0" encoding="utf-8"?>
<diff>
  <add sel="/index">
    <entry name="baz_macro" value="extensions\test_mod\assets\fx\macros\baz_macro" />
  </add>
</diff>
"#;
    install
        .extension(
            "test_mod",
            &[],
            &[
                ("index/macros.xml", diff.as_bytes()),
                ("libraries/wares.xml", b"<wares version=\"mod\"/>"),
                ("assets/fx/macros/baz_macro.xml", BAZ_MACRO.as_bytes()),
            ],
        )
        .extension_loose("test_mod", "libraries/mod_only.xml", b"<mod_only/>");
    install
}
