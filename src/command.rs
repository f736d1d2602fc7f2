//! Bot commands issued through pull request comments.
//!
//! Parsing is side-effect free: a comment body goes in, a [`Command`] (or the
//! reason it could not be understood) comes out. Keywords are matched as
//! case-sensitive substrings in a fixed priority order.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

use crate::error::BotError;

pub const START_PIPELINE: &str = "start pipeline";
pub const CHERRY_PICK: &str = "cherry-pick to:";
pub const MARK_CONVENTIONAL: &str = "mark-pr as";
pub const SYNC: &str = "sync";

static CHERRY_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\* *((?:[[:word:]]+[_.-]?)+)").expect("valid regex"));

static CHERRY_BACKTICK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`((?:[[:word:]]+[_.-]?)+)`").expect("valid regex"));

static CONVENTIONAL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{MARK_CONVENTIONAL}(?::\s*|\s+)(fix|feat|([[:word:]]+))\s*$"))
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartPipeline,
    CherryPick,
    MarkConventional,
    Sync,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartPipeline => "start pipeline",
            Self::CherryPick => "cherry-pick",
            Self::MarkConventional => "mark-pr",
            Self::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// Options given to `start pipeline`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip the slow parts of the pipeline
    pub fast: bool,
    /// Repository -> ref overrides (`pull/<n>/head` or a branch name)
    pub pull_requests: IndexMap<String, String>,
}

/// Conventional-commit types the bot is willing to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitType {
    Fix,
    Feat,
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fix => f.write_str("fix"),
            Self::Feat => f.write_str("feat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartPipeline(BuildOptions),
    CherryPick(Vec<String>),
    MarkConventional(CommitType),
    Sync,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StartPipeline(_) => CommandKind::StartPipeline,
            Self::CherryPick(_) => CommandKind::CherryPick,
            Self::MarkConventional(_) => CommandKind::MarkConventional,
            Self::Sync => CommandKind::Sync,
        }
    }
}

/// A recognised command whose arguments could not be parsed.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct CommandError {
    pub kind: CommandKind,
    pub source: BotError,
}

/// Turn a comment body into a command.
///
/// `pr_author` is the login of the pull request author; `mark-pr as` is only
/// honoured on pull requests opened by `dependency_bot`. Returns `Ok(None)`
/// when no keyword matches.
pub fn parse_command(
    body: &str,
    pr_author: &str,
    dependency_bot: &str,
) -> Result<Option<Command>, CommandError> {
    if body.contains(START_PIPELINE) {
        let (options, error) = parse_build_options(body);
        return match error {
            Some(source) => Err(CommandError {
                kind: CommandKind::StartPipeline,
                source,
            }),
            None => Ok(Some(Command::StartPipeline(options))),
        };
    }

    if body.contains(CHERRY_PICK) {
        return parse_cherry_target_branches(body)
            .map(|branches| Some(Command::CherryPick(branches)))
            .map_err(|source| CommandError {
                kind: CommandKind::CherryPick,
                source,
            });
    }

    if body.contains(MARK_CONVENTIONAL) && pr_author.contains(dependency_bot) {
        return parse_commit_type(body)
            .map(|kind| Some(Command::MarkConventional(kind)))
            .map_err(|source| CommandError {
                kind: CommandKind::MarkConventional,
                source,
            });
    }

    if body.contains(SYNC) {
        return Ok(Some(Command::Sync));
    }

    Ok(None)
}

/// Parse `start pipeline --pr <repo>/<ref-spec> ... --fast`.
///
/// Every well-formed `--pr` argument ends up in the returned options even
/// when another one is malformed. Only the error for the last malformed
/// argument is kept.
pub fn parse_build_options(body: &str) -> (BuildOptions, Option<BotError>) {
    let mut options = BuildOptions::default();
    let mut error = None;

    let words: Vec<&str> = body.split_whitespace().collect();
    for (idx, word) in words.iter().enumerate() {
        match *word {
            "--pr" => {
                let Some(spec) = words.get(idx + 1) else {
                    continue;
                };
                match parse_pr_spec(spec) {
                    Some((repo, revision)) => {
                        options.pull_requests.insert(repo, revision);
                    }
                    None => {
                        error = Some(BotError::Parse {
                            token: (*spec).to_string(),
                        });
                    }
                }
            }
            "--fast" => options.fast = true,
            _ => {}
        }
    }

    (options, error)
}

/// Normalise one `--pr` argument into `(repo, revision)`.
///
/// Accepted shapes: `repo/<n>`, `repo/<branch>`, `repo/pull/<n>` and
/// `repo/pull/<n>/head`.
fn parse_pr_spec(spec: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = spec.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }

    let revision = match parts.as_slice() {
        [_, number] if number.parse::<u64>().is_ok() => format!("pull/{number}/head"),
        [_, branch] => (*branch).to_string(),
        [_, rest @ ..] if rest.len() == 2 => format!("{}/head", rest.join("/")),
        [_, rest @ ..] if rest.len() == 3 => rest.join("/"),
        _ => return None,
    };

    Some((parts[0].to_string(), revision))
}

/// Extract the cherry-pick target branches, in the order they were written.
///
/// A bulleted list (`* 2.6.x` per line) takes precedence over back-ticked
/// names on a single line.
pub fn parse_cherry_target_branches(body: &str) -> Result<Vec<String>, BotError> {
    let bulleted = parse_cherry_bullets(body);
    if !bulleted.is_empty() {
        return Ok(bulleted);
    }

    let quoted = parse_cherry_backticks(body);
    if !quoted.is_empty() {
        return Ok(quoted);
    }

    Err(BotError::NoTargetBranches(body.to_string()))
}

fn parse_cherry_bullets(body: &str) -> Vec<String> {
    body.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| CHERRY_BULLET.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn parse_cherry_backticks(body: &str) -> Vec<String> {
    let rest = body
        .find(CHERRY_PICK)
        .map_or(body, |idx| &body[idx + CHERRY_PICK.len()..]);

    CHERRY_BACKTICK
        .captures_iter(rest)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parse the type keyword of `mark-pr as <type>`.
pub fn parse_commit_type(body: &str) -> Result<CommitType, BotError> {
    let caps = CONVENTIONAL_TYPE.captures(body).ok_or_else(|| {
        BotError::InvalidCommand("could not parse the body for some reason".to_string())
    })?;

    if let Some(other) = caps.get(2) {
        return Err(BotError::InvalidCommand(format!(
            "type keyword {} not allowed",
            other.as_str()
        )));
    }

    match caps.get(1).map(|m| m.as_str()) {
        Some("fix") => Ok(CommitType::Fix),
        Some("feat") => Ok(CommitType::Feat),
        _ => Err(BotError::InvalidCommand(
            "could not parse the body for some reason".to_string(),
        )),
    }
}
