use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::CollaboratorError;

const FORK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FORK_POLL_ATTEMPTS: u32 = 5;

/// A parsed repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
}

/// One file to commit in a proposed update.
#[derive(Debug, Clone)]
pub struct FileUpdate {
    pub path: String,
    pub content: String,
}

/// Extract owner, repo and optional branch from a GitHub URL. Handles the
/// plain, `.git`, `/tree/<branch>` and `/blob/<branch>/<path>` forms.
pub fn parse_repo_url(url: &str) -> Option<RepoRef> {
    let re =
        Regex::new(r"github\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/(?:tree|blob)/([^/]+))?(?:$|/)")
            .unwrap();
    let caps = re.captures(url)?;
    Some(RepoRef {
        owner: caps[1].to_string(),
        repo: caps[2].trim_end_matches(".git").to_string(),
        branch: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
    #[serde(default)]
    permissions: RepoPermissions,
}

#[derive(Debug, Default, Deserialize)]
struct RepoPermissions {
    #[serde(default)]
    push: bool,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// REST client for the source host: Dockerfile discovery, content fetch, and
/// the commit/PR write-back workflow.
pub struct SourceRepoClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl SourceRepoClient {
    pub fn new(token: Option<String>) -> Result<Self, CollaboratorError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("dockerlens/0.3"));

        if let Some(ref t) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", t))
                .map_err(|_| CollaboratorError::Unavailable("invalid API token".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(SourceRepoClient {
            client,
            token,
            base_url: "https://api.github.com".to_string(),
        })
    }

    /// Locate a Dockerfile: repository root first, then a recursive tree
    /// walk. NotFound when the repository has none.
    pub async fn find_dockerfile(&self, owner: &str, repo: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/repos/{owner}/{repo}/contents", self.base_url);
        if let Ok(entries) = self.get_typed::<Vec<ContentsEntry>>(&url).await {
            for entry in entries {
                if entry.kind == "file" && entry.name.eq_ignore_ascii_case("dockerfile") {
                    return Ok(entry.path);
                }
            }
        }

        let mut all = self.find_all_dockerfiles(owner, repo).await?;
        if all.is_empty() {
            return Err(CollaboratorError::NotFound(format!(
                "no Dockerfile in {owner}/{repo}"
            )));
        }
        all.sort();
        Ok(all.remove(0))
    }

    /// Every Dockerfile path in the repository's default branch, sorted.
    pub async fn find_all_dockerfiles(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<String>, CollaboratorError> {
        let info = self.repo_info(owner, repo).await?;
        let url = format!(
            "{}/repos/{owner}/{repo}/git/trees/{}?recursive=1",
            self.base_url, info.default_branch
        );
        let tree: TreeResponse = self.get_typed(&url).await?;

        let mut paths: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|e| {
                e.kind == "blob"
                    && e.path
                        .rsplit('/')
                        .next()
                        .is_some_and(|name| name.eq_ignore_ascii_case("dockerfile"))
            })
            .map(|e| e.path)
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Fetch decoded file content via the contents API raw media type.
    pub async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let mut url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.base_url);
        if let Some(branch) = branch {
            url.push_str(&format!("?ref={branch}"));
        }

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github.raw")
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("content fetch: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound(format!(
                "{path} in {owner}/{repo}"
            ))),
            s if !s.is_success() => Err(CollaboratorError::Unavailable(format!(
                "content fetch returned {s}"
            ))),
            _ => response
                .text()
                .await
                .map_err(|e| CollaboratorError::Unavailable(format!("content fetch: {e}"))),
        }
    }

    /// Commit the given file updates on a branch and open a PR; returns the
    /// PR URL. When the token cannot push to the repository the update goes
    /// through a fork, waiting for fork readiness with a bounded retry.
    pub async fn propose_update(
        &self,
        owner: &str,
        repo: &str,
        updates: &[FileUpdate],
        branch_name: &str,
        title: &str,
        body: &str,
    ) -> Result<String, CollaboratorError> {
        if self.token.is_none() {
            return Err(CollaboratorError::PermissionDenied(
                "an API token is required to open a pull request".into(),
            ));
        }

        let info = self.repo_info(owner, repo).await?;
        let base_branch = info.default_branch.clone();

        // PermissionDenied on the direct path is recoverable: fork instead.
        let target_owner = if info.permissions.push {
            owner.to_string()
        } else {
            self.ensure_fork(owner, repo).await?
        };

        let base_sha = self.branch_sha(owner, repo, &base_branch).await?;
        let base_tree_sha = self.commit_tree_sha(owner, repo, &base_sha).await?;

        let tree_items: Vec<serde_json::Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "path": u.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": u.content,
                })
            })
            .collect();

        let tree: serde_json::Value = self
            .post_json(
                &format!("{}/repos/{target_owner}/{repo}/git/trees", self.base_url),
                &json!({"base_tree": base_tree_sha, "tree": tree_items}),
            )
            .await?;
        let new_tree_sha = json_str(&tree, "sha")?;

        let commit: serde_json::Value = self
            .post_json(
                &format!("{}/repos/{target_owner}/{repo}/git/commits", self.base_url),
                &json!({
                    "message": title,
                    "tree": new_tree_sha,
                    "parents": [base_sha],
                }),
            )
            .await?;
        let new_commit_sha = json_str(&commit, "sha")?;

        self.upsert_branch_ref(&target_owner, repo, branch_name, &new_commit_sha)
            .await?;

        let head = if target_owner != owner {
            format!("{target_owner}:{branch_name}")
        } else {
            branch_name.to_string()
        };

        let pr: serde_json::Value = self
            .post_json(
                &format!("{}/repos/{owner}/{repo}/pulls", self.base_url),
                &json!({"title": title, "body": body, "head": head, "base": base_branch}),
            )
            .await?;

        pr.get("html_url")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Unavailable("PR response had no html_url".into()))
    }

    /// Fork the repository and wait until the fork answers. Fixed interval,
    /// fixed attempt count; exhaustion is a named timeout, never a silent
    /// proceed-as-if-ready.
    async fn ensure_fork(&self, owner: &str, repo: &str) -> Result<String, CollaboratorError> {
        let user = self.authenticated_user().await?;
        let _: serde_json::Value = self
            .post_json(
                &format!("{}/repos/{owner}/{repo}/forks", self.base_url),
                &json!({}),
            )
            .await?;

        for _ in 0..FORK_POLL_ATTEMPTS {
            tokio::time::sleep(FORK_POLL_INTERVAL).await;
            let url = format!("{}/repos/{user}/{repo}", self.base_url);
            if self.get_typed::<RepoInfo>(&url).await.is_ok() {
                return Ok(user);
            }
        }

        Err(CollaboratorError::Timeout(format!(
            "fork readiness of {user}/{repo} after {FORK_POLL_ATTEMPTS} attempts"
        )))
    }

    async fn authenticated_user(&self) -> Result<String, CollaboratorError> {
        #[derive(Deserialize)]
        struct User {
            login: String,
        }
        let user: User = self.get_typed(&format!("{}/user", self.base_url)).await?;
        Ok(user.login)
    }

    async fn repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo, CollaboratorError> {
        self.get_typed(&format!("{}/repos/{owner}/{repo}", self.base_url))
            .await
    }

    async fn branch_sha(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, CollaboratorError> {
        let value: serde_json::Value = self
            .get_typed(&format!(
                "{}/repos/{owner}/{repo}/git/refs/heads/{branch}",
                self.base_url
            ))
            .await?;
        value
            .pointer("/object/sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Unavailable("ref response had no sha".into()))
    }

    async fn commit_tree_sha(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
    ) -> Result<String, CollaboratorError> {
        let value: serde_json::Value = self
            .get_typed(&format!(
                "{}/repos/{owner}/{repo}/git/commits/{commit_sha}",
                self.base_url
            ))
            .await?;
        value
            .pointer("/tree/sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::Unavailable("commit response had no tree sha".into()))
    }

    async fn upsert_branch_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), CollaboratorError> {
        let ref_url = format!(
            "{}/repos/{owner}/{repo}/git/refs/heads/{branch}",
            self.base_url
        );

        let exists = self.get_typed::<serde_json::Value>(&ref_url).await.is_ok();
        if exists {
            let response = self
                .client
                .patch(&ref_url)
                .json(&json!({"sha": sha, "force": true}))
                .send()
                .await
                .map_err(|e| CollaboratorError::Unavailable(format!("ref update: {e}")))?;
            return map_write_status(response).await.map(|_| ());
        }

        let _: serde_json::Value = self
            .post_json(
                &format!("{}/repos/{owner}/{repo}/git/refs", self.base_url),
                &json!({"ref": format!("refs/heads/{branch}"), "sha": sha}),
            )
            .await?;
        Ok(())
    }

    async fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, CollaboratorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("request failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                CollaboratorError::PermissionDenied(extract_api_error(response).await),
            ),
            s if !s.is_success() => Err(CollaboratorError::Unavailable(format!(
                "API returned {s} for {url}"
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| CollaboratorError::Unavailable(format!("bad API payload: {e}"))),
        }
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("request failed: {e}")))?;
        map_write_status(response).await
    }
}

/// Map a write response, extracting the host's structured error message when
/// one is present.
async fn map_write_status(
    response: reqwest::Response,
) -> Result<serde_json::Value, CollaboratorError> {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound(extract_api_error(response).await)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
            CollaboratorError::PermissionDenied(extract_api_error(response).await),
        ),
        s if !s.is_success() => Err(CollaboratorError::Unavailable(
            extract_api_error(response).await,
        )),
        _ => response
            .json()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("bad API payload: {e}"))),
    }
}

/// Pull `errors[0].message` or `message` out of an API error body, falling
/// back to a generic string.
async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(_) => return format!("API returned {status}"),
    };
    body.pointer("/errors/0/message")
        .or_else(|| body.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("API returned {status}"))
}

fn json_str(value: &serde_json::Value, key: &str) -> Result<String, CollaboratorError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| CollaboratorError::Unavailable(format!("API response missing '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_repo_url() {
        let r = parse_repo_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(r.owner, "acme");
        assert_eq!(r.repo, "widgets");
        assert_eq!(r.branch, None);
    }

    #[test]
    fn test_parse_git_suffix() {
        let r = parse_repo_url("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(r.repo, "widgets");
    }

    #[test]
    fn test_parse_tree_branch() {
        let r = parse_repo_url("https://github.com/acme/widgets/tree/develop").unwrap();
        assert_eq!(r.branch.as_deref(), Some("develop"));
    }

    #[test]
    fn test_parse_blob_path() {
        let r = parse_repo_url("https://github.com/acme/widgets/blob/main/docker/Dockerfile")
            .unwrap();
        assert_eq!(r.owner, "acme");
        assert_eq!(r.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_parse_repo_with_dots() {
        let r = parse_repo_url("https://github.com/acme/my.service.api").unwrap();
        assert_eq!(r.repo, "my.service.api");
    }

    #[test]
    fn test_non_github_url_rejected() {
        assert!(parse_repo_url("https://example.com/acme/widgets").is_none());
    }
}
