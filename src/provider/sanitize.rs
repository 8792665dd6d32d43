//! Transcript sanitization before a chat-completions call.

use std::collections::{HashMap, HashSet};

use crate::types::{Message, MessageKind};

/// Prefix of the system note that replaces the self-discussion message.
pub const SELF_DISCUSSION_NOTE: &str = "Internal self-discussion plan (not visible to the user):";

/// Content of the wire-only result for a call that never got an answer.
pub const MISSING_RESULT: &str = "Error: no result was produced for this tool call.";

/// Reshape a transcript so chat-completions APIs accept it.
///
/// Each AI message that requested tools is followed by exactly one result
/// per call, in request order. The self-discussion pseudo tool message is
/// rendered as a system note, and tool messages that answer nothing are
/// dropped. The caller's transcript is left untouched.
pub fn sanitize_transcript(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut seen_tool_results: HashSet<String> = HashSet::new();

    let mut i = 0usize;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.is_self_discussion() {
            out.push(Message::system(format!(
                "{SELF_DISCUSSION_NOTE}\n{}",
                msg.content
            )));
            i += 1;
            continue;
        }
        if msg.kind != MessageKind::Ai {
            if msg.kind != MessageKind::Tool {
                out.push(msg.clone());
            }
            i += 1;
            continue;
        }

        if msg.tool_calls.is_empty() {
            out.push(msg.clone());
            i += 1;
            continue;
        }

        let tool_call_ids: HashSet<&str> = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        let mut span_results: HashMap<String, Message> = HashMap::new();
        let mut remainder: Vec<Message> = Vec::new();

        let mut j = i + 1;
        while j < messages.len() {
            let next = &messages[j];
            if next.kind != MessageKind::Tool {
                break;
            }
            if next.is_self_discussion() {
                remainder.push(Message::system(format!(
                    "{SELF_DISCUSSION_NOTE}\n{}",
                    next.content
                )));
            } else if let Some(id) = next.tool_call_id.as_deref() {
                if tool_call_ids.contains(id) && !seen_tool_results.contains(id) {
                    span_results.insert(id.to_string(), next.clone());
                    seen_tool_results.insert(id.to_string());
                }
            }
            j += 1;
        }

        out.push(msg.clone());
        for call in &msg.tool_calls {
            match span_results.remove(&call.id) {
                Some(existing) => out.push(existing),
                None => out.push(Message::tool(call.name.clone(), call.id.clone(), MISSING_RESULT)),
            }
        }
        out.extend(remainder);
        i = j;
    }

    out
}
