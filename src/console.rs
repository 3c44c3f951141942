//! Terminal input
//!
//! Lines typed at the terminal go to gdb unchanged unless they start with
//! `:`, which introduces a front-end command.

use anyhow::{anyhow, bail};
use gdbannot::{SessionRequest, ViewKind};

pub const HELP: &str = "\
:watch EXPR      watch an expression
:expand HANDLE   list the children of a watch
:collapse HANDLE hide the children of a watch
:unwatch HANDLE  delete a root watch
:update          re-evaluate changed watches
:show VIEW       start displaying a view
:hide VIEW       stop displaying a view
:show watch      update watches whenever gdb stops
:hide watch      stop updating watches automatically
:refresh VIEW    refresh a view now
:views           print all views as JSON
:help            this text";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Gdb(String),
    Watch(String),
    Expand(String),
    Collapse(String),
    Unwatch(String),
    Update,
    Show(ViewKind),
    Hide(ViewKind),
    WatchDisplay(bool),
    Refresh(ViewKind),
    Views,
    Help,
}

impl Input {
    /// Session request carrying out this input, if it maps to one directly
    pub fn into_request(self) -> Option<SessionRequest> {
        let request = match self {
            Input::Gdb(line) => SessionRequest::Submit(line),
            Input::Watch(expression) => SessionRequest::WatchCreate(expression),
            Input::Expand(handle) => SessionRequest::WatchExpand(handle),
            Input::Collapse(handle) => SessionRequest::WatchCollapse(handle),
            Input::Unwatch(handle) => SessionRequest::WatchDelete(handle),
            Input::Update => SessionRequest::WatchUpdateAll,
            Input::Show(kind) => SessionRequest::SetViewVisible(kind, true),
            Input::Hide(kind) => SessionRequest::SetViewVisible(kind, false),
            Input::WatchDisplay(visible) => SessionRequest::SetWatchVisible(visible),
            Input::Refresh(kind) => SessionRequest::Refresh(kind),
            Input::Views | Input::Help => return None,
        };
        Some(request)
    }
}

pub fn parse(line: &str) -> anyhow::Result<Input> {
    let Some(meta) = line.strip_prefix(':') else {
        return Ok(Input::Gdb(line.to_string()));
    };

    let (command, argument) = match meta.trim().split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (meta.trim(), ""),
    };
    let required = |what: &str| -> anyhow::Result<String> {
        if argument.is_empty() {
            Err(anyhow!(":{} needs {}", command, what))
        } else {
            Ok(argument.to_string())
        }
    };

    Ok(match command {
        "watch" => Input::Watch(required("an expression")?),
        "expand" => Input::Expand(required("a handle")?),
        "collapse" => Input::Collapse(required("a handle")?),
        "unwatch" => Input::Unwatch(required("a handle")?),
        "update" => Input::Update,
        "show" | "hide" if is_watch_display(argument) => Input::WatchDisplay(command == "show"),
        "show" => Input::Show(view(argument)?),
        "hide" => Input::Hide(view(argument)?),
        "refresh" => Input::Refresh(view(argument)?),
        "views" => Input::Views,
        "help" => Input::Help,
        other => bail!("unknown command :{} (try :help)", other),
    })
}

fn is_watch_display(name: &str) -> bool {
    matches!(name, "watch" | "watches")
}

fn view(name: &str) -> anyhow::Result<ViewKind> {
    ViewKind::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = ViewKind::ALL.iter().map(|k| k.name()).collect();
        anyhow!("unknown view '{}', expected one of {}", name, names.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_go_to_gdb() {
        assert_eq!(parse("break main").unwrap(), Input::Gdb("break main".to_string()));
        assert_eq!(parse("").unwrap(), Input::Gdb(String::new()));
    }

    #[test]
    fn test_watch_keeps_whole_expression() {
        assert_eq!(
            parse(":watch buf[i] + 1").unwrap(),
            Input::Watch("buf[i] + 1".to_string())
        );
    }

    #[test]
    fn test_view_commands() {
        assert_eq!(parse(":show locals").unwrap(), Input::Show(ViewKind::Locals));
        assert_eq!(parse(":hide regs").unwrap(), Input::Hide(ViewKind::Registers));
        assert_eq!(parse(":refresh stack").unwrap(), Input::Refresh(ViewKind::Stack));
        assert!(parse(":show nothing").is_err());
    }

    #[test]
    fn test_watch_display_commands() {
        assert_eq!(parse(":show watch").unwrap(), Input::WatchDisplay(true));
        assert_eq!(parse(":hide watches").unwrap(), Input::WatchDisplay(false));
        assert!(matches!(
            Input::WatchDisplay(true).into_request(),
            Some(SessionRequest::SetWatchVisible(true))
        ));
    }

    #[test]
    fn test_missing_argument_is_rejected() {
        let err = parse(":expand").unwrap_err();
        assert!(err.to_string().contains("needs a handle"));
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse(":frobnicate").is_err());
    }

    #[test]
    fn test_into_request() {
        assert!(matches!(
            Input::Unwatch("var1".to_string()).into_request(),
            Some(SessionRequest::WatchDelete(handle)) if handle == "var1"
        ));
        assert!(Input::Views.into_request().is_none());
    }
}
