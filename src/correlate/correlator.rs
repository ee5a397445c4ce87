use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use chrono::Duration;

use crate::model::{synthetic_name, ChannelType, Stream, StreamId, TimeWindow, ViewSchema};
use crate::predicate::{parse, tokenize, Token, TokenKind};

use super::errors::{CorrelateError, CorrelateResult};
use super::scanner::{LexerReferenceScanner, ReferenceScanner, RegexReferenceScanner, StreamReference};

/// Member streams of a correlated view and where their columns land
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedLayout {
    members: Vec<Stream>,
    offsets: Vec<usize>,
    schema: ViewSchema,
}

impl CorrelatedLayout {
    fn new(primary: &Stream, others: Vec<Stream>) -> Self {
        let mut members = Vec::with_capacity(others.len() + 1);
        members.push(primary.clone());
        members.extend(others);

        let mut offsets = Vec::with_capacity(members.len());
        let mut types: Vec<ChannelType> = Vec::new();
        for member in &members {
            offsets.push(types.len());
            types.extend(member.channels.iter().map(|c| c.channel_type));
        }

        Self {
            members,
            offsets,
            schema: ViewSchema::synthetic(&types),
        }
    }

    pub fn primary(&self) -> &Stream {
        &self.members[0]
    }

    /// Union order: primary first
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.members.iter().map(|s| s.id).collect()
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn schema(&self) -> &ViewSchema {
        &self.schema
    }

    /// Positional column holding `stream.channel`
    pub fn column_for(&self, stream: &str, channel: &str) -> Option<String> {
        let index = self.members.iter().position(|s| s.name == stream)?;
        let ordinal = self.members[index].channel_index(channel)?;
        Some(synthetic_name(self.offsets[index] + ordinal))
    }
}

/// Plans the merge of streams referenced from a predicate
#[derive(Clone)]
pub struct CrossStreamCorrelator {
    scanner: Arc<dyn ReferenceScanner>,
    max_window: Duration,
}

impl std::fmt::Debug for CrossStreamCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossStreamCorrelator")
            .field("max_window", &self.max_window)
            .finish()
    }
}

impl CrossStreamCorrelator {
    /// Correlator using the whitespace-bounded reference grammar
    pub fn new(max_window: Duration) -> Self {
        let scanner: Arc<dyn ReferenceScanner> = match RegexReferenceScanner::new() {
            Ok(scanner) => Arc::new(scanner),
            Err(_) => Arc::new(LexerReferenceScanner),
        };
        Self::with_scanner(scanner, max_window)
    }

    pub fn with_scanner(scanner: Arc<dyn ReferenceScanner>, max_window: Duration) -> Self {
        Self {
            scanner,
            max_window,
        }
    }

    pub fn max_window(&self) -> Duration {
        self.max_window
    }

    /// Names of streams other than `primary` referenced in `predicate`,
    /// distinct, in order of first appearance
    pub fn referenced_streams(&self, primary: &Stream, predicate: &str) -> CorrelateResult<Vec<String>> {
        let tokens = tokenize(predicate)?;
        let mut seen = HashSet::new();
        Ok(self
            .references(predicate, &tokens)
            .into_iter()
            .filter(|r| r.stream != primary.name)
            .filter(|r| seen.insert(r.stream.clone()))
            .map(|r| r.stream)
            .collect())
    }

    /// Correlation materializes every row in the window, so it must be
    /// bounded on both ends and no longer than the ceiling
    pub fn check_window(&self, window: &TimeWindow) -> CorrelateResult<()> {
        window.validate().map_err(CorrelateError::Window)?;
        window
            .check_bound(self.max_window)
            .map_err(CorrelateError::Window)
    }

    pub fn layout(&self, primary: &Stream, others: Vec<Stream>) -> CorrelatedLayout {
        CorrelatedLayout::new(primary, others)
    }

    /// Rewrites `predicate` to the layout's positional columns
    ///
    /// Bare names are primary channels. Every `stream.channel` must be
    /// picked up by the scanner; one left in place is an error.
    pub fn rewrite(&self, layout: &CorrelatedLayout, predicate: &str) -> CorrelateResult<String> {
        let tokens = tokenize(predicate)?;
        let mut edits = Vec::new();

        for reference in self.references(predicate, &tokens) {
            let column = layout
                .column_for(&reference.stream, &reference.channel)
                .ok_or_else(|| CorrelateError::UnknownChannel {
                    stream: reference.stream.clone(),
                    channel: reference.channel.clone(),
                })?;
            edits.push((reference.span, column));
        }

        for (i, token) in tokens.iter().enumerate() {
            if let Some(name) = bare_column(&tokens, i) {
                if let Some(ordinal) = layout.primary().channel_index(name) {
                    edits.push((token.start..token.end, synthetic_name(ordinal)));
                }
            }
        }

        let rewritten = apply_edits(predicate, edits);
        ensure_resolved(&rewritten)?;
        Ok(rewritten)
    }

    /// Rewrites references to the primary stream itself into bare names
    ///
    /// Used when a predicate names no other stream, so no merge is needed.
    pub fn rewrite_local(&self, primary: &Stream, predicate: &str) -> CorrelateResult<String> {
        let tokens = tokenize(predicate)?;
        let mut edits = Vec::new();
        for reference in self.references(predicate, &tokens) {
            if reference.stream != primary.name {
                continue;
            }
            let channel = primary
                .channel_index(&reference.channel)
                .and_then(|ordinal| primary.channel(ordinal))
                .ok_or_else(|| CorrelateError::UnknownChannel {
                    stream: reference.stream.clone(),
                    channel: reference.channel.clone(),
                })?;
            edits.push((reference.span, channel.name.clone()));
        }
        let rewritten = apply_edits(predicate, edits);
        ensure_resolved(&rewritten)?;
        Ok(rewritten)
    }

    /// Scanner hits that begin on an identifier token
    ///
    /// Drops matches inside string literals.
    fn references(&self, predicate: &str, tokens: &[Token]) -> Vec<StreamReference> {
        let ident_starts: HashSet<usize> = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Ident(_)))
            .map(|t| t.start)
            .collect();
        self.scanner
            .scan(predicate)
            .into_iter()
            .filter(|r| ident_starts.contains(&r.span.start))
            .collect()
    }
}

/// Identifier at `i` used as a plain column name
fn bare_column(tokens: &[Token], i: usize) -> Option<&str> {
    let TokenKind::Ident(name) = &tokens[i].kind else {
        return None;
    };
    let after_dot = i > 0 && tokens[i - 1].kind == TokenKind::Dot;
    let before = tokens.get(i + 1).map(|t| &t.kind);
    let qualified_or_call = matches!(before, Some(TokenKind::Dot) | Some(TokenKind::LParen));
    if after_dot || qualified_or_call || name.eq_ignore_ascii_case("timestamp") {
        return None;
    }
    Some(name)
}

fn apply_edits(text: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(text.len() + edits.len() * 8);
    let mut cursor = 0;
    for (span, replacement) in edits {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn ensure_resolved(text: &str) -> CorrelateResult<()> {
    let expr = parse(text)?;
    match expr.qualified_refs().first() {
        Some((stream, channel)) => Err(CorrelateError::UnresolvedReference(format!(
            "{}.{}",
            stream, channel
        ))),
        None => Ok(()),
    }
}
