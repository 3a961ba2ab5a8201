//! Bot commands.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "say hello and show the menu")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "show the menu")]
    Menu,
    #[command(description = "show your stats")]
    Stats,
    #[command(description = "toggle quiet mode")]
    Quiet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "roost_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/stats@roost_bot", "roost_bot").unwrap(), Command::Stats);
        assert!(Command::parse("/unknown", "roost_bot").is_err());
        assert!(Command::parse("/start@other_bot", "roost_bot").is_err());
    }

    #[test]
    fn test_descriptions_list_every_command() {
        let help = Command::descriptions().to_string();
        for name in ["/start", "/help", "/menu", "/stats", "/quiet"] {
            assert!(help.contains(name), "help should mention {name}");
        }
    }
}
