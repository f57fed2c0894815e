use serde::{Deserialize, Serialize};

/// Application runtime inferred from Dockerfile/image text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Python,
    Node,
    Go,
    Java,
    Unknown,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::Node => "node",
            Runtime::Go => "go",
            Runtime::Java => "java",
            Runtime::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PYTHON_MARKERS: &[&str] = &["python", "pip", "requirements.txt", "poetry.lock"];
const NODE_MARKERS: &[&str] = &["node", "npm", "yarn", "package.json", "package-lock.json"];
const GO_MARKERS: &[&str] = &["go build", "go.mod", "go.sum", "golang"];
const JAVA_MARKERS: &[&str] = &["java -jar", "javac", "mvn ", "gradle ", "pom.xml", "build.gradle"];

/// Classify the runtime from combined lower-cased text (base image plus all
/// instruction commands).
///
/// Categories are checked in a fixed priority order (python, node, go, java)
/// and the first hit wins even when a later category's markers are also
/// present. The ordering is part of the contract: mixed-stack Dockerfiles
/// must classify deterministically.
pub fn classify(text: &str) -> Runtime {
    let text = text.to_lowercase();

    if PYTHON_MARKERS.iter().any(|m| text.contains(m)) {
        return Runtime::Python;
    }
    if NODE_MARKERS.iter().any(|m| text.contains(m)) {
        return Runtime::Node;
    }
    if GO_MARKERS.iter().any(|m| text.contains(m)) {
        return Runtime::Go;
    }
    if JAVA_MARKERS.iter().any(|m| text.contains(m)) {
        return Runtime::Java;
    }

    Runtime::Unknown
}
