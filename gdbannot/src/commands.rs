//! Command text issued by the engine
//!
//! Every command the engine sends on its own behalf is built here, so the
//! server prefix and the `interpreter mi` wrapping stay in one place.

use crate::config::EngineConfig;
use crate::mi::escape_c_string;
use crate::types::ViewKind;

/// Commands queued when a session starts, paired with whether their reply
/// carries the main source file
pub fn setup_commands(config: &EngineConfig) -> Vec<(String, bool)> {
    vec![
        ("set height 0\n".to_string(), false),
        ("set width 0\n".to_string(), false),
        // C and Fortran spell the entry point differently; one of these fails.
        (server(config, "list main"), false),
        (server(config, "list MAIN__"), false),
        (server(config, "info source"), true),
    ]
}

/// Prefix a command with the server prefix and terminate it
pub fn server(config: &EngineConfig, command: &str) -> String {
    format!("{}{}\n", config.server_prefix, command)
}

/// Terminate user input with exactly one newline
pub fn user_line(text: &str) -> String {
    let mut line = text.trim_end_matches('\n').to_string();
    line.push('\n');
    line
}

/// Query text of a view, or `None` when the view cannot be asked for yet
pub fn view_command(config: &EngineConfig, kind: ViewKind) -> Option<String> {
    let command = match kind {
        ViewKind::Frame => "info frame".to_string(),
        ViewKind::Breakpoints => "info breakpoints".to_string(),
        ViewKind::Stack => "info stack".to_string(),
        ViewKind::Locals => "info locals".to_string(),
        ViewKind::Registers => {
            if config.all_registers {
                "info all-registers".to_string()
            } else {
                "info registers".to_string()
            }
        }
        ViewKind::Memory => {
            let memory = &config.memory;
            let address = memory.address.as_deref()?;
            format!(
                "x/{}{}{} {}",
                memory.count,
                memory.format.letter(),
                memory.unit.letter(),
                address
            )
        }
        ViewKind::Threads => "info threads".to_string(),
        ViewKind::Disassembly => "disassemble".to_string(),
    };

    Some(server(config, &command))
}

/// Run an MI command through the console interpreter
pub fn mi(config: &EngineConfig, command: &str) -> String {
    server(config, &format!("interpreter mi \"{}\"", escape_c_string(command)))
}

pub fn var_create(config: &EngineConfig, expression: &str) -> String {
    mi(
        config,
        &format!("-var-create - * \"{}\"", escape_c_string(expression)),
    )
}

pub fn var_evaluate(config: &EngineConfig, handle: &str) -> String {
    mi(config, &format!("-var-evaluate-expression {}", handle))
}

pub fn var_list_children(config: &EngineConfig, handle: &str) -> String {
    mi(config, &format!("-var-list-children --all-values {}", handle))
}

pub fn var_update(config: &EngineConfig) -> String {
    mi(config, "-var-update *")
}

pub fn var_delete(config: &EngineConfig, handle: &str) -> String {
    mi(config, &format!("-var-delete {}", handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryFormat, MemoryUnit};

    #[test]
    fn test_setup_commands() {
        let config = EngineConfig::default();
        let commands: Vec<String> = setup_commands(&config).into_iter().map(|(c, _)| c).collect();

        assert_eq!(
            commands,
            vec![
                "set height 0\n",
                "set width 0\n",
                "server list main\n",
                "server list MAIN__\n",
                "server info source\n",
            ]
        );
    }

    #[test]
    fn test_view_commands_use_prefix() {
        let mut config = EngineConfig::default();
        config.server_prefix = "server ".to_string();

        assert_eq!(
            view_command(&config, ViewKind::Breakpoints).as_deref(),
            Some("server info breakpoints\n")
        );
        config.all_registers = true;
        assert_eq!(
            view_command(&config, ViewKind::Registers).as_deref(),
            Some("server info all-registers\n")
        );
    }

    #[test]
    fn test_memory_command_needs_address() {
        let mut config = EngineConfig::default();
        assert_eq!(view_command(&config, ViewKind::Memory), None);

        config.memory.address = Some("&buf".to_string());
        config.memory.count = 8;
        config.memory.format = MemoryFormat::Decimal;
        config.memory.unit = MemoryUnit::Byte;
        assert_eq!(
            view_command(&config, ViewKind::Memory).as_deref(),
            Some("server x/8db &buf\n")
        );
    }

    #[test]
    fn test_var_create_quotes_expression_twice() {
        let config = EngineConfig::default();
        assert_eq!(
            var_create(&config, "s.name"),
            "server interpreter mi \"-var-create - * \\\"s.name\\\"\"\n"
        );
    }

    #[test]
    fn test_user_line_single_newline() {
        assert_eq!(user_line("next"), "next\n");
        assert_eq!(user_line("next\n"), "next\n");
    }
}
