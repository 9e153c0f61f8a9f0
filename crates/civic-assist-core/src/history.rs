//! Turns the chat log into the strictly alternating user/model sequence the
//! generative-text API accepts.

use crate::state::{ChatMessage, NormalizedTurn, TurnRole};

/// Walk the log from the newest message backward, keeping each message
/// whose role is the one expected next and flipping the expectation after
/// every kept turn. Messages that would repeat a role are skipped.
///
/// The result ends on a `user` turn and starts on one too: a leading
/// `model` turn (usually the seeded welcome) is dropped. Messages without
/// text, such as an image-only upload, carry nothing the model can read and
/// are skipped. An empty result means there is nothing to send.
pub fn normalize(messages: &[ChatMessage]) -> Vec<NormalizedTurn> {
    let mut turns = Vec::new();
    let mut expected = TurnRole::User;

    for message in messages.iter().rev() {
        if message.content.trim().is_empty() {
            continue;
        }
        let role = TurnRole::from(message.role);
        if role != expected {
            continue;
        }
        turns.push(NormalizedTurn {
            role,
            text: message.content.clone(),
        });
        expected = expected.flipped();
    }

    // Collected newest-first; the last element is the oldest turn.
    if turns.last().map(|t| t.role) == Some(TurnRole::Model) {
        turns.pop();
    }
    turns.reverse();
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roles(turns: &[NormalizedTurn]) -> Vec<TurnRole> {
        turns.iter().map(|t| t.role).collect()
    }

    fn texts(turns: &[NormalizedTurn]) -> Vec<&str> {
        turns.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_empty_history() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_only_welcome() {
        let log = vec![ChatMessage::assistant("Vanakkam!")];
        assert!(normalize(&log).is_empty());
    }

    #[test]
    fn test_welcome_then_user() {
        let log = vec![ChatMessage::assistant("Vanakkam!"), ChatMessage::user("hi")];
        let turns = normalize(&log);
        assert_eq!(roles(&turns), vec![TurnRole::User]);
        assert_eq!(texts(&turns), vec!["hi"]);
    }

    #[test]
    fn test_alternating_log_kept_whole() {
        let log = vec![
            ChatMessage::user("A"),
            ChatMessage::assistant("B"),
            ChatMessage::user("C"),
        ];
        let turns = normalize(&log);
        assert_eq!(texts(&turns), vec!["A", "B", "C"]);
        assert_eq!(
            roles(&turns),
            vec![TurnRole::User, TurnRole::Model, TurnRole::User]
        );
    }

    #[test]
    fn test_repeated_user_messages_collapse() {
        // The newest of a run of user messages is kept; the earlier ones
        // are skipped until a model turn appears.
        let log = vec![
            ChatMessage::assistant("welcome"),
            ChatMessage::user("first"),
            ChatMessage::assistant("answer"),
            ChatMessage::user("second"),
            ChatMessage::user("third"),
        ];
        let turns = normalize(&log);
        assert_eq!(texts(&turns), vec!["first", "answer", "third"]);
    }

    #[test]
    fn test_trailing_assistant_is_skipped() {
        let log = vec![ChatMessage::user("q"), ChatMessage::assistant("a")];
        let turns = normalize(&log);
        assert_eq!(texts(&turns), vec!["q"]);
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let log = vec![
            ChatMessage::user("q1"),
            ChatMessage::assistant(""),
            ChatMessage::user("q2"),
        ];
        let turns = normalize(&log);
        assert_eq!(texts(&turns), vec!["q2"]);
    }

    fn arb_log() -> impl Strategy<Value = Vec<ChatMessage>> {
        prop::collection::vec((any::<bool>(), "[a-z ]{0,6}"), 0..40).prop_map(|items| {
            items
                .into_iter()
                .map(|(is_user, text)| {
                    if is_user {
                        ChatMessage::user(text)
                    } else {
                        ChatMessage::assistant(text)
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_turns_alternate(log in arb_log()) {
            let turns = normalize(&log);
            for pair in turns.windows(2) {
                prop_assert_ne!(pair[0].role, pair[1].role);
            }
            if let Some(first) = turns.first() {
                prop_assert_eq!(first.role, TurnRole::User);
            }
            if let Some(last) = turns.last() {
                prop_assert_eq!(last.role, TurnRole::User);
            }
        }

        #[test]
        fn prop_empty_only_without_user_text(log in arb_log()) {
            let has_user_text = log
                .iter()
                .any(|m| m.role == crate::state::ChatRole::User && !m.content.trim().is_empty());
            prop_assert_eq!(normalize(&log).is_empty(), !has_user_text);
        }
    }
}
