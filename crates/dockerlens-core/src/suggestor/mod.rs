use crate::analyzer::report::{Finding, ImageAnalysis, RuntimeAnalysis, SuggestedDockerfile};
use crate::parser::runtime::Runtime;

const DISCLAIMER: &str = "This Dockerfile is a suggestion generated from image analysis. \
Review and adjust before using in production.";

/// Compilation markers that push an interpreted runtime onto the two-stage
/// path: the build output should not ship with its toolchain.
const BUILD_STEP_MARKERS: &[&str] = &["npm run build", "yarn build", "tsc", "webpack", "pip wheel"];

/// Generate the deterministic hardened-Dockerfile fallback.
///
/// Invoked only when the AI optimizer is unavailable or errors; pure and
/// deterministic given the same inputs. Interpreted runtimes stay
/// single-stage unless a compilation step is detected; compiled runtimes
/// always get a builder stage plus a minimal final stage.
pub fn generate(
    runtime: Runtime,
    image: &ImageAnalysis,
    runtime_analysis: &RuntimeAnalysis,
    findings: &[Finding],
) -> SuggestedDockerfile {
    let build_step = has_build_step(image);

    let (base, dockerfile, mut explanation) = match runtime {
        Runtime::Python => python_template(build_step),
        Runtime::Node => node_template(build_step),
        Runtime::Go => go_template(),
        Runtime::Java => java_template(),
        Runtime::Unknown => fallback_template(),
    };

    if runtime_analysis.runs_as_root {
        explanation.push(
            "The original image ran as root; the suggestion creates and switches to a non-root user."
                .to_string(),
        );
    }
    let misconfig_count = findings.len();
    if misconfig_count > 0 {
        explanation.push(format!(
            "Addresses {misconfig_count} detected finding(s) from the analysis pass."
        ));
    }

    SuggestedDockerfile {
        kind: "suggested".to_string(),
        base_image: base.to_string(),
        dockerfile,
        explanation,
        disclaimer: DISCLAIMER.to_string(),
    }
}

fn has_build_step(image: &ImageAnalysis) -> bool {
    image.layers.iter().any(|l| {
        let cmd = l.command.to_lowercase();
        BUILD_STEP_MARKERS.iter().any(|m| cmd.contains(m))
    })
}

fn python_template(build_step: bool) -> (&'static str, String, Vec<String>) {
    if build_step {
        let dockerfile = "\
FROM python:3.12-slim AS builder
WORKDIR /app
COPY requirements.txt .
RUN pip wheel --no-cache-dir --wheel-dir /wheels -r requirements.txt

FROM python:3.12-slim
WORKDIR /app
COPY --from=builder /wheels /wheels
RUN pip install --no-cache-dir /wheels/* && rm -rf /wheels
COPY . .
RUN useradd --create-home appuser && chown -R appuser:appuser /app
USER appuser
EXPOSE 8000
CMD [\"gunicorn\", \"--bind\", \"0.0.0.0:8000\", \"app:app\"]
"
        .to_string();
        let explanation = vec![
            "Wheels are built in a separate stage so compilers never reach the final image."
                .to_string(),
            "Slim Python base reduces image size and CVE surface.".to_string(),
        ];
        ("python:3.12-slim", dockerfile, explanation)
    } else {
        let dockerfile = "\
FROM python:3.12-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
RUN useradd --create-home appuser && chown -R appuser:appuser /app
USER appuser
EXPOSE 8000
CMD [\"gunicorn\", \"--bind\", \"0.0.0.0:8000\", \"app:app\"]
"
        .to_string();
        let explanation = vec![
            "Slim Python base reduces image size and CVE surface.".to_string(),
            "Dependency file is copied before the source tree so the pip layer stays cached."
                .to_string(),
            "Gunicorn replaces any development server entrypoint.".to_string(),
        ];
        ("python:3.12-slim", dockerfile, explanation)
    }
}

fn node_template(build_step: bool) -> (&'static str, String, Vec<String>) {
    if build_step {
        let dockerfile = "\
FROM node:20-alpine AS builder
WORKDIR /app
COPY package*.json ./
RUN npm ci
COPY . .
RUN npm run build && npm prune --omit=dev

FROM node:20-alpine
WORKDIR /app
COPY --from=builder --chown=node:node /app/dist ./dist
COPY --from=builder --chown=node:node /app/node_modules ./node_modules
COPY --from=builder --chown=node:node /app/package.json .
USER node
EXPOSE 3000
CMD [\"node\", \"dist/server.js\"]
"
        .to_string();
        let explanation = vec![
            "Build tooling stays in the builder stage; the final image holds only artifacts and production dependencies.".to_string(),
            "Runs as the stock non-root node user with explicit ownership.".to_string(),
        ];
        ("node:20-alpine", dockerfile, explanation)
    } else {
        let dockerfile = "\
FROM node:20-alpine
WORKDIR /app
COPY package*.json ./
RUN npm ci --omit=dev && npm cache clean --force
COPY --chown=node:node . .
USER node
EXPOSE 3000
CMD [\"node\", \"server.js\"]
"
        .to_string();
        let explanation = vec![
            "Alpine Node base keeps the image small.".to_string(),
            "Lockfile-first copy keeps the npm ci layer cached across source changes."
                .to_string(),
            "Starts node directly instead of npm for proper signal handling.".to_string(),
        ];
        ("node:20-alpine", dockerfile, explanation)
    }
}

fn go_template() -> (&'static str, String, Vec<String>) {
    let dockerfile = "\
FROM golang:1.22-alpine AS builder
WORKDIR /app
COPY go.mod go.sum ./
RUN go mod download
COPY . .
RUN CGO_ENABLED=0 GOOS=linux go build -ldflags=\"-s -w\" -o /app/server .

FROM gcr.io/distroless/static-debian12
COPY --from=builder /app/server /server
USER nonroot
EXPOSE 8080
ENTRYPOINT [\"/server\"]
"
    .to_string();
    let explanation = vec![
        "Static Go binary is built in a builder stage and copied alone into distroless."
            .to_string(),
        "Distroless final stage has no shell or package manager to attack.".to_string(),
    ];
    ("gcr.io/distroless/static-debian12", dockerfile, explanation)
}

fn java_template() -> (&'static str, String, Vec<String>) {
    let dockerfile = "\
FROM maven:3.9-eclipse-temurin-21 AS builder
WORKDIR /app
COPY pom.xml .
RUN mvn dependency:go-offline
COPY . .
RUN mvn clean package -DskipTests

FROM eclipse-temurin:21-jre-alpine
WORKDIR /app
COPY --from=builder /app/target/*.jar app.jar
RUN addgroup -S app && adduser -S app -G app
USER app
EXPOSE 8080
CMD [\"java\", \"-jar\", \"app.jar\"]
"
    .to_string();
    let explanation = vec![
        "Maven and the JDK stay in the builder stage; only the jar and a JRE ship."
            .to_string(),
        "pom.xml-first copy keeps the dependency layer cached.".to_string(),
    ];
    ("eclipse-temurin:21-jre-alpine", dockerfile, explanation)
}

fn fallback_template() -> (&'static str, String, Vec<String>) {
    let dockerfile = "\
FROM alpine:3.21
WORKDIR /app
COPY . .
RUN addgroup -S app && adduser -S app -G app && chown -R app:app /app
USER app
CMD [\"sh\"]
"
    .to_string();
    let explanation = vec![
        "Runtime could not be identified; minimal Alpine base with a non-root user is the safe default.".to_string(),
    ];
    ("alpine:3.21", dockerfile, explanation)
}

/// Recommended .dockerignore to pair with any suggested Dockerfile.
pub fn dockerignore() -> &'static str {
    ".git\n.env\n*.log\nnode_modules\n__pycache__\ndist\ncoverage\n"
}
