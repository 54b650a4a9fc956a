//! Command template grammar.
//!
//! The external command is given as a single string with one `{input}`
//! placeholder for the chunk file path. The template is tokenized with
//! shell-like quoting rules once at parse time, so the supported shapes are
//! explicit and testable:
//!
//! - `{input}` anywhere in a token is replaced with the chunk's absolute path
//!   at render time.
//! - Under concurrent dispatch each chunk carries a [`ChunkIdentity`], and two
//!   rewriting rules make the command's output filenames chunk-unique:
//!   1. a token containing `{input}.EXT` (placeholder, dot, alphanumeric
//!      extension) has the identity spliced in before the extension, covering
//!      tools that derive an output name by appending to the input name;
//!   2. a token following a recognized output flag (`-o` or a long flag
//!      starting with `--out`, including the `--flag=value` form) whose value
//!      ends in the table extension has the identity spliced in before that
//!      extension, covering tools that take an explicit output path. Other
//!      flags' arguments (auxiliary inputs like `--db ref.table`) are left
//!      alone. Tokens containing the placeholder are owned by rule 1 and are
//!      skipped here.
//!
//! A template whose tokens match neither rule cannot carry an identity at
//! all; [`CommandTemplate::can_disambiguate`] reports this so the dispatcher
//! can avoid relying on markers that were never written.
//!
//! A template without the placeholder is rejected at parse time.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Placeholder substituted with the chunk input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// `{input}.EXT` - placeholder immediately followed by a file extension.
static PLACEHOLDER_WITH_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{input\}\.([A-Za-z0-9]+)").expect("static pattern"));

/// Unique token attached to a chunk before concurrent dispatch.
///
/// The wrapped tool writes into an output directory shared by all workers;
/// splicing the identity into derived output filenames (and filtering the
/// directory diff for it afterwards) is what keeps sibling chunks' files
/// apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIdentity(pub usize);

impl ChunkIdentity {
    /// Fragment inserted before a filename's extension: `name.c3.ext`.
    fn splice(&self) -> String {
        format!(".c{}", self.0)
    }

    /// Dot-delimited marker as it appears in a spliced filename.
    ///
    /// Delimiting on both sides keeps `c3` from matching inside `c31`.
    pub fn marker(&self) -> String {
        format!(".c{}.", self.0)
    }

    /// Whether a filename carries this identity.
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.contains(&self.marker())
    }
}

/// A tokenized command template ready for per-chunk rendering.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

impl CommandTemplate {
    /// Tokenize a template string with shell-like quoting rules.
    pub fn parse(raw: &str) -> Result<Self> {
        let tokens = shell_words::split(raw)
            .with_context(|| format!("tokenize command template: {raw}"))?;
        if tokens.is_empty() {
            bail!("command template is empty");
        }
        if !tokens.iter().any(|t| t.contains(INPUT_PLACEHOLDER)) {
            bail!("command template must contain the {INPUT_PLACEHOLDER} placeholder: {raw}");
        }
        Ok(Self { tokens })
    }

    /// Whether the rewriting rules would mark any token with an identity.
    ///
    /// When they would not, concurrent invocations produce output files that
    /// cannot be told apart after the fact; the dispatcher must not filter on
    /// markers that were never written.
    pub fn can_disambiguate(&self, table_ext: &str) -> bool {
        let mut tokens = self.tokens.clone();
        splice_identity(&mut tokens, ChunkIdentity(0), table_ext)
    }

    /// Render the argument vector for one chunk.
    ///
    /// `input` must be the chunk file's absolute path. With an identity, the
    /// filename rewriting rules run before the placeholder is substituted;
    /// `table_ext` is the extension recognized by the output-flag rule.
    pub fn render(
        &self,
        input: &Path,
        identity: Option<ChunkIdentity>,
        table_ext: &str,
    ) -> Vec<String> {
        let mut tokens = self.tokens.clone();
        if let Some(id) = identity {
            splice_identity(&mut tokens, id, table_ext);
        }

        let input = input.display().to_string();
        for token in &mut tokens {
            if token.contains(INPUT_PLACEHOLDER) {
                *token = token.replace(INPUT_PLACEHOLDER, &input);
            }
        }
        tokens
    }
}

/// Apply both rewriting rules in place, reporting whether anything changed.
fn splice_identity(tokens: &mut [String], id: ChunkIdentity, table_ext: &str) -> bool {
    let splice = id.splice();
    let derived = format!("{{input}}{splice}.$1");
    let flag_suffix = format!(".{table_ext}");
    let mut changed = false;
    let mut prev_is_output_flag = false;
    for token in tokens.iter_mut() {
        if PLACEHOLDER_WITH_EXT.is_match(token) {
            *token = PLACEHOLDER_WITH_EXT.replace_all(token, derived.as_str()).into_owned();
            changed = true;
        }
        let has_placeholder = token.contains(INPUT_PLACEHOLDER);
        if !has_placeholder
            && token.ends_with(&flag_suffix)
            && (prev_is_output_flag || is_output_flag_assignment(token))
        {
            let stem = &token[..token.len() - flag_suffix.len()];
            *token = format!("{stem}{splice}{flag_suffix}");
            changed = true;
        }
        prev_is_output_flag = !token.contains('=') && is_output_flag(token);
    }
    changed
}

fn is_output_flag(token: &str) -> bool {
    token == "-o" || token.starts_with("--out")
}

/// `--out...=value` form, where the value lives in the flag token itself.
fn is_output_flag_assignment(token: &str) -> bool {
    token.split_once('=').is_some_and(|(flag, _)| is_output_flag(flag))
}
