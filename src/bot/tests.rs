//! Engine tests: commands, callbacks and plain messages against an in-memory database.

use super::*;
use std::sync::Arc;

const OWNER: i64 = 1;
const ALICE: i64 = 100;

fn engine() -> BotEngine {
    let db = Arc::new(Database::in_memory().unwrap());
    BotEngine::new(db, [OWNER])
}

fn sender(user_id: i64) -> Sender {
    Sender { user_id, username: Some(format!("user{user_id}")), first_name: "Alice".to_string() }
}

fn message(user_id: i64, message_id: i64, text: &str, is_private: bool) -> IncomingMessage {
    IncomingMessage {
        message_id,
        chat_id: if is_private { user_id } else { -12345 },
        sender: sender(user_id),
        timestamp: "2024-01-15 10:00:00".to_string(),
        text: text.to_string(),
        is_private,
    }
}

mod commands {
    use super::*;

    #[test]
    fn test_start_registers_user_and_shows_menu() {
        let engine = engine();
        let reply = engine.on_command(&sender(ALICE), Command::Start).unwrap();

        assert!(reply.text.contains("Alice"));
        assert!(reply.keyboard.is_some());
        let user = engine.database().get_user(ALICE).unwrap().expect("user stored");
        assert_eq!(user.message_count, 0);
    }

    #[test]
    fn test_help_lists_commands() {
        let reply = engine().on_command(&sender(ALICE), Command::Help).unwrap();
        assert!(reply.text.contains("/quiet"));
        assert!(reply.keyboard.is_none());
    }

    #[test]
    fn test_menu_has_keyboard() {
        let reply = engine().on_command(&sender(ALICE), Command::Menu).unwrap();
        assert!(reply.keyboard.is_some());
    }

    #[test]
    fn test_stats_before_any_message() {
        let reply = engine().on_command(&sender(ALICE), Command::Stats).unwrap();
        assert!(reply.text.contains("haven't seen any messages"));
    }

    #[test]
    fn test_stats_counts_messages() {
        let engine = engine();
        engine.on_message(&message(ALICE, 1, "hello", false)).unwrap();
        engine.on_message(&message(ALICE, 2, "again", false)).unwrap();

        let reply = engine.on_command(&sender(ALICE), Command::Stats).unwrap();
        assert!(reply.text.contains("2 message(s) since 2024-01-15"));
        assert!(!reply.text.contains("Global"));
    }

    #[test]
    fn test_stats_for_owner_include_global_counts() {
        let engine = engine();
        engine.on_message(&message(ALICE, 1, "hello", false)).unwrap();

        let reply = engine.on_command(&sender(OWNER), Command::Stats).unwrap();
        assert!(reply.text.contains("Global: 2 user(s), 1 message(s)."));
    }

    #[test]
    fn test_quiet_toggles() {
        let engine = engine();
        let on = engine.on_command(&sender(ALICE), Command::Quiet).unwrap();
        assert!(on.text.contains("Quiet mode is on"));
        assert!(engine.is_quiet(ALICE).unwrap());

        let off = engine.on_command(&sender(ALICE), Command::Quiet).unwrap();
        assert!(off.text.contains("Quiet mode is off"));
        assert!(!engine.is_quiet(ALICE).unwrap());
    }
}

mod callbacks {
    use super::*;

    #[test]
    fn test_callbacks_keep_menu() {
        let engine = engine();
        for action in CallbackAction::ALL {
            let reply = engine.on_callback(&sender(ALICE), action).unwrap();
            assert!(reply.keyboard.is_some(), "{action} should keep the menu");
        }
    }

    #[test]
    fn test_quiet_callback_shares_state_with_command() {
        let engine = engine();
        engine.on_callback(&sender(ALICE), CallbackAction::Quiet).unwrap();
        assert!(engine.is_quiet(ALICE).unwrap());

        let reply = engine.on_command(&sender(ALICE), Command::Quiet).unwrap();
        assert!(reply.text.contains("off"));
    }

    #[test]
    fn test_stats_callback() {
        let engine = engine();
        engine.on_message(&message(ALICE, 1, "hi", true)).unwrap();
        let reply = engine.on_callback(&sender(ALICE), CallbackAction::Stats).unwrap();
        assert!(reply.text.contains("1 message(s)"));
    }
}

mod messages {
    use super::*;

    #[test]
    fn test_plain_private_message_recorded_without_reply() {
        let engine = engine();
        let reply = engine.on_message(&message(ALICE, 1, "just chatting", true)).unwrap();
        assert!(reply.is_none());
        assert_eq!(engine.database().counts().unwrap().messages, 1);
    }

    #[test]
    fn test_unknown_private_command_gets_hint() {
        let reply = engine().on_message(&message(ALICE, 1, "/frobnicate", true)).unwrap();
        assert!(reply.expect("hint expected").text.contains("/help"));
    }

    #[test]
    fn test_unknown_command_in_group_is_silent() {
        let reply = engine().on_message(&message(ALICE, 1, "/frobnicate", false)).unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn test_quiet_user_gets_no_hint() {
        let engine = engine();
        engine.on_command(&sender(ALICE), Command::Quiet).unwrap();
        let reply = engine.on_message(&message(ALICE, 1, "/frobnicate", true)).unwrap();
        assert!(reply.is_none());
        // Still recorded.
        assert_eq!(engine.database().counts().unwrap().messages, 1);
    }

    #[test]
    fn test_quiet_is_per_user() {
        let engine = engine();
        engine.on_command(&sender(ALICE), Command::Quiet).unwrap();
        let reply = engine.on_message(&message(200, 1, "/frobnicate", true)).unwrap();
        assert!(reply.is_some());
    }
}
