//! Cherry-picking merged pull requests onto release branches.

use log::{error, info};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::{GitProtocol, Registry};
use crate::error::{BotError, Result};
use crate::events::PullRequestEvent;
use crate::git::{GitRunner, GitWorkspace};
use crate::providers::github::types::{NewPullRequest, PullRequest, User};
use crate::providers::HostingService;
use crate::release_tool::IntegrationCheckout;
use crate::releases::latest_release_branches;
use crate::remotes::github_remote_url;

const UPSTREAM_REMOTE: &str = "mendersoftware";

const REPORT_HEADER: &str =
    "Hi :smiley_cat:\nI did my very best, and this is the result of the cherry pick operation:\n";

static CHANGELOG_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^    changelog:").expect("valid regex"));

static NONE_CHANGELOG_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^    changelog: *none").expect("valid regex"));

/// Result of cherry-picking onto one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryPickOutcome {
    /// Number of the pull request opened for the branch
    Success(u64),
    Conflict,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub branch: String,
    pub outcome: CherryPickOutcome,
}

/// Report comment with one line per branch, in request order.
pub fn report_comment(outcomes: &[BranchOutcome]) -> String {
    let mut comment = REPORT_HEADER.to_string();
    for BranchOutcome { branch, outcome } in outcomes {
        let line = match outcome {
            CherryPickOutcome::Success(number) => {
                format!("* {branch} :heavy_check_mark: #{number}\n")
            }
            CherryPickOutcome::Conflict => format!(
                "* {branch} Had merge conflicts, you will have to \
                 fix this yourself :crying_cat_face:\n"
            ),
            CherryPickOutcome::Error(message) => {
                format!("* {branch} :red_circle: Error: {message}\n")
            }
        };
        comment.push_str(&line);
    }
    comment
}

/// Name used to address whoever asked for a cherry-pick.
fn display_name(user: &User) -> &str {
    user.name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.login)
}

/// Number of changelog trailers in `git log` output, `Changelog: None` excluded.
pub fn count_changelog_entries(log: &str) -> usize {
    log.lines()
        .filter(|line| CHANGELOG_TRAILER.is_match(line) && !NONE_CHANGELOG_TRAILER.is_match(line))
        .count()
}

/// Cherry-picks changes of one upstream repository.
pub struct CherryPicker<'a> {
    pub git: &'a dyn GitRunner,
    pub protocol: GitProtocol,
    /// Organization owning the canonical repository
    pub upstream_org: &'a str,
    pub repo: &'a str,
}

impl<'a> CherryPicker<'a> {
    fn upstream_url(&self) -> String {
        github_remote_url(self.protocol, self.upstream_org, self.repo)
    }

    /// Apply `pr` on top of `target` in a fresh workspace.
    ///
    /// Returns the workspace and the scratch branch holding the result.
    async fn try_cherry_pick(
        &self,
        pr: &PullRequest,
        target: &str,
    ) -> Result<(GitWorkspace<'a>, String)> {
        let branch = format!("cherry-{target}-{}", pr.head.ref_);
        let workspace = GitWorkspace::init(self.git).await?;
        workspace
            .add_remote(UPSTREAM_REMOTE, &self.upstream_url())
            .await?;
        workspace.run(["fetch", UPSTREAM_REMOTE]).await?;
        let upstream_target = format!("{UPSTREAM_REMOTE}/{target}");
        workspace.run(["checkout", upstream_target.as_str()]).await?;
        workspace.run(["checkout", "-b", branch.as_str()]).await?;

        let excluded_base = format!("^{}", pr.base.sha);
        let picked = workspace
            .run([
                "cherry-pick",
                "-x",
                "--allow-empty",
                pr.head.sha.as_str(),
                excluded_base.as_str(),
            ])
            .await;
        match picked {
            Ok(_) => Ok((workspace, branch)),
            Err(e) if e.is_conflict() => Err(BotError::Conflict),
            Err(e) => Err(e),
        }
    }

    /// Whether `pr` applies cleanly on `target`.
    pub async fn applies_cleanly(&self, pr: &PullRequest, target: &str) -> bool {
        match self.try_cherry_pick(pr, target).await {
            Ok(_) => true,
            Err(e) => {
                info!("Trial cherry-pick onto {target} failed: {e}");
                false
            }
        }
    }

    /// Cherry-pick `pr` onto `target` and open a pull request with the result.
    pub async fn cherry_pick_to_branch(
        &self,
        hosting: &dyn HostingService,
        pr: &PullRequest,
        title: &str,
        requester: &User,
        target: &str,
    ) -> Result<PullRequest> {
        let (workspace, branch) = self.try_cherry_pick(pr, target).await?;
        let refspec = format!("{branch}:{branch}");
        workspace
            .run(["push", UPSTREAM_REMOTE, refspec.as_str()])
            .await?;

        let new_pr = NewPullRequest {
            title: format!("[Cherry {target}]: {title}"),
            head: branch,
            base: target.to_string(),
            body: format!(
                "Cherry pick of PR: #{}\nFor you {} :)",
                pr.number,
                display_name(requester)
            ),
            maintainer_can_modify: true,
        };
        hosting
            .create_pull_request(self.upstream_org, self.repo, &new_pr)
            .await
            .map_err(|e| BotError::PullRequestCreation {
                repo: self.repo.to_string(),
                source: Box::new(e),
            })
    }

    /// Cherry-pick `pr` onto every target in order and report on `pr`.
    pub async fn cherry_pick(
        &self,
        hosting: &dyn HostingService,
        pr: &PullRequest,
        title: &str,
        requester: &User,
        targets: &[String],
    ) -> Result<Vec<BranchOutcome>> {
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = match self
                .cherry_pick_to_branch(hosting, pr, title, requester, target)
                .await
            {
                Ok(new_pr) => CherryPickOutcome::Success(new_pr.number),
                Err(BotError::Conflict) => CherryPickOutcome::Conflict,
                Err(e) => {
                    error!("Failed to cherry pick: {title} to {target}, err: {e}");
                    CherryPickOutcome::Error(e.to_string())
                }
            };
            outcomes.push(BranchOutcome {
                branch: target.clone(),
                outcome,
            });
        }

        hosting
            .create_comment(
                self.upstream_org,
                self.repo,
                pr.number,
                &report_comment(&outcomes),
            )
            .await?;
        Ok(outcomes)
    }
}

/// Where release branches are looked up when suggesting cherry-picks.
pub struct ReleaseLookup<'a> {
    pub checkout: &'a IntegrationCheckout,
    pub versions_url: &'a str,
}

/// Comment suggesting backports of a merged pull request that carries changelog entries.
pub async fn suggest_cherry_picks(
    picker: &CherryPicker<'_>,
    hosting: &dyn HostingService,
    registry: &Registry,
    releases: &ReleaseLookup<'_>,
    event: &PullRequestEvent,
) -> Result<()> {
    let pr = &event.pull_request;
    if event.action != "closed" || !pr.merged {
        info!(
            "Ignoring cherry-pick suggestions for action: {}, merged: {}",
            event.action, pr.merged
        );
        return Ok(());
    }
    let base_ref = pr.base.ref_.as_str();
    if base_ref != "master" && base_ref != "main" {
        info!("Ignoring cherry-pick suggestions for base ref: {base_ref}");
        return Ok(());
    }
    let repo = event.repo();
    if !registry.is_lts(repo) {
        info!("Ignoring non-LTS repository: {repo}");
        return Ok(());
    }

    let pr_branch = format!("pr_{}", pr.number);
    let workspace = GitWorkspace::init(picker.git).await?;
    workspace
        .add_remote("github", &picker.upstream_url())
        .await?;
    let local_base = format!("{base_ref}:local");
    workspace
        .run(["fetch", "github", local_base.as_str()])
        .await?;
    let pr_head = format!("pull/{}/head:{pr_branch}", pr.number);
    workspace.run(["fetch", "github", pr_head.as_str()]).await?;

    let range = format!("{}...{pr_branch}", pr.base.sha);
    let log = workspace.run(["log", range.as_str()]).await?;
    if count_changelog_entries(&log) == 0 {
        info!("Found no changelog entries, ignoring cherry-pick suggestions");
        return Ok(());
    }

    let mut suggestions = Vec::new();
    if registry.is_client(repo) {
        workspace.run(["fetch", "github"]).await?;
        let versions = latest_release_branches(releases.versions_url).await?;

        let mut branches = Vec::new();
        {
            let checkout = releases.checkout.lock().await;
            for version in versions {
                let branch = checkout
                    .resolver()
                    .version_of(repo, &format!("origin/{version}"))
                    .await?;
                if !branch.is_empty() {
                    branches.push((branch, version));
                }
            }
        }

        for (branch, version) in branches {
            let mut line = format!("{branch} (release {version})");
            if picker.applies_cleanly(pr, &branch).await {
                line.push_str(" - :robot: :cherries:");
            }
            suggestions.push(line);
        }
    }

    let comment = if suggestions.is_empty() {
        "\nHello :smiley_cat: This PR contains changelog entries. Please, verify the need of \
         backporting it to the supported release branches.\n"
            .to_string()
    } else {
        format!(
            "\nHello :smiley_cat: This PR contains changelog entries. Please, verify the need of \
             backporting it to the following release branches:\n{}\n",
            suggestions.join("\n")
        )
    };
    hosting
        .create_comment(picker.upstream_org, repo, pr.number, &comment)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::ScriptedGit;
    use crate::providers::github::testing::FakeHosting;
    use crate::providers::github::types::{PullRequestBranch, Repository};
    use crate::release_tool::testing::FakeResolver;
    use std::sync::Arc;

    const CONFLICT: &str = "error: could not apply 1a2b3c4... fix\n\
                            hint: after resolving the conflicts, mark the corrected paths";

    fn pull_request() -> PullRequest {
        PullRequest {
            number: 1234,
            title: "fix: crash on boot".into(),
            merged: true,
            head: PullRequestBranch {
                ref_: "fix-crash".into(),
                sha: "headsha".into(),
                ..PullRequestBranch::default()
            },
            base: PullRequestBranch {
                ref_: "master".into(),
                sha: "basesha".into(),
                ..PullRequestBranch::default()
            },
            ..PullRequest::default()
        }
    }

    fn requester() -> User {
        User {
            login: "bob".into(),
            name: Some("Bob Builder".into()),
        }
    }

    fn picker(git: &ScriptedGit) -> CherryPicker<'_> {
        CherryPicker {
            git,
            protocol: GitProtocol::Ssh,
            upstream_org: "mendersoftware",
            repo: "mender",
        }
    }

    fn targets(branches: &[&str]) -> Vec<String> {
        branches.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_all_branches_succeed_in_request_order() {
        let git = ScriptedGit::new();
        let hosting = FakeHosting::new();

        let outcomes = picker(&git)
            .cherry_pick(
                &hosting,
                &pull_request(),
                "fix: crash on boot",
                &requester(),
                &targets(&["2.6.x", "2.5.x", "2.4.x"]),
            )
            .await
            .unwrap();

        let numbers: Vec<_> = outcomes.iter().map(|o| o.outcome.clone()).collect();
        assert_eq!(
            numbers,
            vec![
                CherryPickOutcome::Success(1001),
                CherryPickOutcome::Success(1002),
                CherryPickOutcome::Success(1003),
            ]
        );
        assert_eq!(
            hosting.comments_on(1234),
            vec![format!(
                "{REPORT_HEADER}* 2.6.x :heavy_check_mark: #1001\n\
                 * 2.5.x :heavy_check_mark: #1002\n\
                 * 2.4.x :heavy_check_mark: #1003\n"
            )]
        );

        let created = hosting.created_prs();
        assert_eq!(created[0].title, "[Cherry 2.6.x]: fix: crash on boot");
        assert_eq!(created[0].head, "cherry-2.6.x-fix-crash");
        assert_eq!(created[0].base, "2.6.x");
        assert_eq!(
            created[0].body,
            "Cherry pick of PR: #1234\nFor you Bob Builder :)"
        );
        assert!(created[0].maintainer_can_modify);
    }

    #[tokio::test]
    async fn test_git_steps_of_one_branch() {
        let git = ScriptedGit::new();
        let hosting = FakeHosting::new();

        picker(&git)
            .cherry_pick(
                &hosting,
                &pull_request(),
                "t",
                &requester(),
                &targets(&["3.0.x"]),
            )
            .await
            .unwrap();

        assert_eq!(
            git.calls(),
            vec![
                "init .",
                "remote add mendersoftware git@github.com:/mendersoftware/mender.git",
                "fetch mendersoftware",
                "checkout mendersoftware/3.0.x",
                "checkout -b cherry-3.0.x-fix-crash",
                "cherry-pick -x --allow-empty headsha ^basesha",
                "push mendersoftware cherry-3.0.x-fix-crash:cherry-3.0.x-fix-crash",
            ]
        );
        assert!(git.dirs().iter().all(|d| !d.exists()));
    }

    #[tokio::test]
    async fn test_conflict_is_reported_as_conflict() {
        let git = ScriptedGit::new().fail_when("cherry-pick", CONFLICT);
        let hosting = FakeHosting::new();

        let outcomes = picker(&git)
            .cherry_pick(
                &hosting,
                &pull_request(),
                "t",
                &requester(),
                &targets(&["3.0.x"]),
            )
            .await
            .unwrap();

        assert_eq!(outcomes[0].outcome, CherryPickOutcome::Conflict);
        assert!(hosting.comments_on(1234)[0].ends_with(
            "* 3.0.x Had merge conflicts, you will have to fix this yourself :crying_cat_face:\n"
        ));
        assert!(!git.calls().iter().any(|c| c.starts_with("push")));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_request_order() {
        let git = ScriptedGit::new()
            .fail_when("checkout mendersoftware/9.9.x", "fatal: invalid reference")
            .fail_when(
                "checkout -b cherry-2.5.x",
                "fatal: a branch named 'cherry-2.5.x' already exists",
            );
        let hosting = FakeHosting::new();

        let outcomes = picker(&git)
            .cherry_pick(
                &hosting,
                &pull_request(),
                "t",
                &requester(),
                &targets(&["9.9.x", "2.5.x", "2.4.x"]),
            )
            .await
            .unwrap();

        assert!(matches!(outcomes[0].outcome, CherryPickOutcome::Error(_)));
        assert!(matches!(outcomes[1].outcome, CherryPickOutcome::Error(_)));
        assert_eq!(outcomes[2].outcome, CherryPickOutcome::Success(1001));

        let comment = &hosting.comments_on(1234)[0];
        let lines: Vec<&str> = comment.lines().skip(2).collect();
        assert!(lines[0].starts_with("* 9.9.x :red_circle: Error: "));
        assert!(lines[1].starts_with("* 2.5.x :red_circle: Error: "));
        assert_eq!(lines[2], "* 2.4.x :heavy_check_mark: #1001");
    }

    #[tokio::test]
    async fn test_pull_request_creation_failure_is_an_error_line() {
        let git = ScriptedGit::new();
        let mut hosting = FakeHosting::new();
        hosting.fail_pull_request_creation = true;

        let outcomes = picker(&git)
            .cherry_pick(
                &hosting,
                &pull_request(),
                "t",
                &requester(),
                &targets(&["3.0.x"]),
            )
            .await
            .unwrap();
        let expected = "Failed to create the PR for: (mender) \
                        API request failed with status 422: Validation Failed";
        assert_eq!(
            outcomes[0].outcome,
            CherryPickOutcome::Error(expected.to_string())
        );
    }

    #[test]
    fn test_requester_falls_back_to_login() {
        assert_eq!(display_name(&requester()), "Bob Builder");
        assert_eq!(
            display_name(&User {
                login: "bob".into(),
                name: None
            }),
            "bob"
        );
    }

    #[test]
    fn test_count_changelog_entries() {
        let log = "commit abc\n\
                   Author: A <a@example.com>\n\
                   \n    fix: crash\n\
                   \n    Changelog: Fix crash on boot\n\
                   \n    changelog: none\n\
                   \n    Changelog:None\n\
                   \n    Changelog: Title\n\
                   Changelog: not indented\n";
        assert_eq!(count_changelog_entries(log), 2);
    }

    fn merged_event(repo: &str) -> PullRequestEvent {
        PullRequestEvent {
            action: "closed".into(),
            number: 1234,
            pull_request: pull_request(),
            repository: Repository {
                name: repo.into(),
                ..Repository::default()
            },
            organization: None,
            sender: requester(),
        }
    }

    #[tokio::test]
    async fn test_suggestions_skip_unmerged_and_non_lts() {
        let git = ScriptedGit::new();
        let hosting = FakeHosting::new();
        let checkout = IntegrationCheckout::new(Arc::new(FakeResolver::new()));
        let releases = ReleaseLookup {
            checkout: &checkout,
            versions_url: "http://127.0.0.1:9/versions.json",
        };

        let mut open = merged_event("mender");
        open.pull_request.merged = false;
        suggest_cherry_picks(
            &picker(&git),
            &hosting,
            &Registry::default(),
            &releases,
            &open,
        )
        .await
        .unwrap();
        suggest_cherry_picks(
            &picker(&git),
            &hosting,
            &Registry::default(),
            &releases,
            &merged_event("deviceauth"),
        )
        .await
        .unwrap();

        assert!(git.calls().is_empty());
        assert!(hosting.comments_on(1234).is_empty());
    }

    #[tokio::test]
    async fn test_no_changelog_entries_no_comment() {
        let git =
            ScriptedGit::new().respond_when("log basesha...pr_1234", "    Changelog: None\n");
        let hosting = FakeHosting::new();
        let checkout = IntegrationCheckout::new(Arc::new(FakeResolver::new()));
        let releases = ReleaseLookup {
            checkout: &checkout,
            versions_url: "http://127.0.0.1:9/versions.json",
        };

        suggest_cherry_picks(
            &picker(&git),
            &hosting,
            &Registry::default(),
            &releases,
            &merged_event("mender"),
        )
        .await
        .unwrap();

        assert_eq!(
            &git.calls()[2..],
            &[
                "fetch github master:local",
                "fetch github pull/1234/head:pr_1234",
                "log basesha...pr_1234",
            ]
        );
        assert!(hosting.comments_on(1234).is_empty());
    }

    #[tokio::test]
    async fn test_generic_suggestion_for_non_client_lts_repository() {
        let git = ScriptedGit::new().respond_when("log ", "    Changelog: Title\n");
        let hosting = FakeHosting::new();
        let checkout = IntegrationCheckout::new(Arc::new(FakeResolver::new()));
        let releases = ReleaseLookup {
            checkout: &checkout,
            versions_url: "http://127.0.0.1:9/versions.json",
        };

        let picker = CherryPicker {
            repo: "mender-gateway",
            ..picker(&git)
        };
        suggest_cherry_picks(
            &picker,
            &hosting,
            &Registry::default(),
            &releases,
            &merged_event("mender-gateway"),
        )
        .await
        .unwrap();

        assert_eq!(
            hosting.comments_on(1234),
            vec![
                "\nHello :smiley_cat: This PR contains changelog entries. \
                 Please, verify the need of backporting it to the supported release branches.\n"
            ]
        );
    }

    #[tokio::test]
    async fn test_release_branches_are_suggested_for_client_repositories() {
        let mut server = mockito::Server::new_async().await;
        let _versions = server
            .mock("GET", "/versions.json")
            .with_status(200)
            .with_body(r#"{"releases": {"3.7": {}, "3.6": {}}, "lts": ["3.6"]}"#)
            .create_async()
            .await;
        let versions_url = format!("{}/versions.json", server.url());

        let git = ScriptedGit::new()
            .respond_when("log ", "    Changelog: Fix crash\n")
            .fail_when("checkout mendersoftware/4.0.x", "fatal: invalid reference");
        let hosting = FakeHosting::new();
        let resolver = FakeResolver::new()
            .with_version("mender", "origin/3.7.x", "5.0.x")
            .with_version("mender", "origin/3.6.x", "4.0.x");
        let checkout = IntegrationCheckout::new(Arc::new(resolver));
        let releases = ReleaseLookup {
            checkout: &checkout,
            versions_url: &versions_url,
        };

        suggest_cherry_picks(
            &picker(&git),
            &hosting,
            &Registry::default(),
            &releases,
            &merged_event("mender"),
        )
        .await
        .unwrap();

        assert_eq!(
            hosting.comments_on(1234),
            vec![
                "\nHello :smiley_cat: This PR contains changelog entries. \
                 Please, verify the need of backporting it to the following release branches:\n\
                 5.0.x (release 3.7.x) - :robot: :cherries:\n\
                 4.0.x (release 3.6.x)\n"
            ]
        );
    }
}
