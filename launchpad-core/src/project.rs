//! The built-in starter project provisioned by `launchpad up`.

use serde_json::json;

use crate::tree::FileSystemTree;

/// Port the starter server listens on inside the sandbox.
pub const STARTER_PORT: u16 = 3111;

pub const ENTRY_POINT: &str = "index.js";
pub const MANIFEST: &str = "package.json";

/// Name of the manifest script the run step invokes.
pub const START_SCRIPT: &str = "start";

const INDEX_JS: &str = r#"import express from 'express';
const app = express();
const port = 3111;

app.get('/', (req, res) => {
    res.send('Welcome to a Launchpad app!');
});

app.listen(port, () => {
    console.log(`App is live at http://localhost:${port}`);
});
"#;

/// Two-file Express project: a server entry point and its manifest.
///
/// The manifest declares `express` and `nodemon` as dependencies and a single
/// `start` script running the entry point under `nodemon`.
pub fn starter_project() -> FileSystemTree {
    let manifest = json!({
        "name": "example-app",
        "type": "module",
        "dependencies": {
            "express": "latest",
            "nodemon": "latest"
        },
        "scripts": {
            START_SCRIPT: format!("nodemon {ENTRY_POINT}")
        }
    });

    FileSystemTree::new()
        .with_file(ENTRY_POINT, INDEX_JS)
        .with_file(MANIFEST, format!("{manifest:#}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FsNode;

    fn contents<'a>(tree: &'a FileSystemTree, name: &str) -> &'a str {
        match tree.get(name) {
            Some(FsNode::File { contents }) => contents,
            other => panic!("expected file at {name}, got {other:?}"),
        }
    }

    #[test]
    fn starter_has_exactly_two_files() {
        let tree = starter_project();
        let names: Vec<_> = tree.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(names, vec![ENTRY_POINT, MANIFEST]);
        tree.validate().expect("starter tree is well formed");
    }

    #[test]
    fn manifest_declares_module_type_dependencies_and_start_script() {
        let tree = starter_project();
        let manifest: serde_json::Value =
            serde_json::from_str(contents(&tree, MANIFEST)).expect("manifest is JSON");
        assert_eq!(manifest["name"], "example-app");
        assert_eq!(manifest["type"], "module");
        assert_eq!(manifest["dependencies"]["express"], "latest");
        assert_eq!(manifest["dependencies"]["nodemon"], "latest");
        assert_eq!(manifest["scripts"]["start"], "nodemon index.js");
        assert_eq!(manifest["scripts"].as_object().map(|s| s.len()), Some(1));
    }

    #[test]
    fn entry_point_listens_on_starter_port() {
        let tree = starter_project();
        assert!(contents(&tree, ENTRY_POINT).contains(&format!("const port = {STARTER_PORT};")));
    }
}
