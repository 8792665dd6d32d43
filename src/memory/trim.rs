//! Token-budgeted view over a message log.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::token::TokenCounter;
use crate::types::{Message, MessageKind};

/// Which end of the log survives trimming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrimStrategy {
    /// Keep the most recent messages.
    #[default]
    Last,
    /// Keep the oldest messages.
    First,
}

/// How to cut a log down to a token budget.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOptions {
    pub max_tokens: usize,
    pub strategy: TrimStrategy,
    /// When the log had to be cut, the window may only begin on this kind.
    pub start_on: Option<MessageKind>,
    /// Allow the boundary message to be shortened instead of dropped.
    pub allow_partial: bool,
    /// Keep a leading system message regardless of strategy.
    pub include_system: bool,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            max_tokens: 7000,
            strategy: TrimStrategy::Last,
            start_on: Some(MessageKind::Human),
            allow_partial: false,
            include_system: true,
        }
    }
}

impl TrimOptions {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Cut `messages` down to `options.max_tokens` as measured by `counter`.
///
/// The result never exceeds the budget. With the `Last` strategy it is the
/// longest suffix that fits (plus the leading system message when kept);
/// if the suffix is shorter than the log, messages are dropped from its
/// front until it begins on `start_on`.
pub fn trim_messages(
    messages: &[Message],
    options: &TrimOptions,
    counter: &dyn TokenCounter,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }
    match options.strategy {
        TrimStrategy::Last => trim_last(messages, options, counter),
        TrimStrategy::First => trim_first(messages, options, counter),
    }
}

fn trim_last(messages: &[Message], options: &TrimOptions, counter: &dyn TokenCounter) -> Vec<Message> {
    let mut budget = options.max_tokens;
    let mut head = Vec::new();
    let mut body = messages;

    if options.include_system {
        if let Some((first, rest)) = messages.split_first() {
            if first.kind == MessageKind::System {
                let cost = counter.count_message(first);
                if cost <= budget {
                    budget -= cost;
                    head.push(first.clone());
                }
                body = rest;
            }
        }
    }

    let mut kept: Vec<Message> = Vec::new();
    let mut cut = false;
    for message in body.iter().rev() {
        let cost = counter.count_message(message);
        if cost <= budget {
            budget -= cost;
            kept.push(message.clone());
            continue;
        }
        cut = true;
        if options.allow_partial {
            if let Some(partial) = keep_tail(message, budget, counter) {
                kept.push(partial);
            }
        }
        break;
    }
    kept.reverse();

    if cut {
        if let Some(kind) = options.start_on {
            let start = kept.iter().position(|m| m.kind == kind).unwrap_or(kept.len());
            kept.drain(..start);
        }
    }

    head.extend(kept);
    head
}

fn trim_first(messages: &[Message], options: &TrimOptions, counter: &dyn TokenCounter) -> Vec<Message> {
    let mut budget = options.max_tokens;
    let mut kept = Vec::new();
    for message in messages {
        let cost = counter.count_message(message);
        if cost <= budget {
            budget -= cost;
            kept.push(message.clone());
            continue;
        }
        if options.allow_partial {
            if let Some(partial) = keep_head(message, budget, counter) {
                kept.push(partial);
            }
        }
        break;
    }
    kept
}

/// Longest word-aligned tail of a plain text message that fits `budget`.
fn keep_tail(message: &Message, budget: usize, counter: &dyn TokenCounter) -> Option<Message> {
    let words: Vec<&str> = message.content.split_inclusive(' ').collect();
    (0..words.len()).find_map(|start| fitting(message, words[start..].concat(), budget, counter))
}

fn keep_head(message: &Message, budget: usize, counter: &dyn TokenCounter) -> Option<Message> {
    let words: Vec<&str> = message.content.split_inclusive(' ').collect();
    (1..=words.len())
        .rev()
        .find_map(|end| fitting(message, words[..end].concat(), budget, counter))
}

fn fitting(message: &Message, content: String, budget: usize, counter: &dyn TokenCounter) -> Option<Message> {
    if content.trim().is_empty() || message.has_tool_calls() {
        return None;
    }
    let candidate = Message {
        content,
        ..message.clone()
    };
    (counter.count_message(&candidate) <= budget).then_some(candidate)
}
