use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::InputMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextTab,
    PrevTab,
    SwitchTab(u8),
    Down,
    Up,
    StartSearch,
    SearchChar(char),
    SearchBackspace,
    CancelSearch,
    EndSearch,
    Refresh,
    RunScan,
    ClearLogs,
    EnterItem,
    CloseOverlay,
    CloseSession,
    ToggleHelp,
    LeaveTerminal,
    TerminalInput(String),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Search => map_search_mode_key(key),
        InputMode::Terminal => map_terminal_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char(c) if key.modifiers.is_empty() && ('1'..='4').contains(&c) => {
            Some(Action::SwitchTab(c.to_digit(10).unwrap_or(1) as u8 - 1))
        }
        KeyCode::Tab | KeyCode::Right => Some(Action::NextTab),
        KeyCode::BackTab | KeyCode::Left => Some(Action::PrevTab),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('/') => Some(Action::StartSearch),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('s') => Some(Action::RunScan),
        KeyCode::Char('c') => Some(Action::ClearLogs),
        KeyCode::Char('x') => Some(Action::CloseSession),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Enter => Some(Action::EnterItem),
        KeyCode::Esc => Some(Action::CloseOverlay),
        _ => None,
    }
}

fn map_search_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelSearch),
        KeyCode::Enter => Some(Action::EndSearch),
        KeyCode::Backspace => Some(Action::SearchBackspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::SearchChar(c))
        }
        _ => None,
    }
}

fn map_terminal_mode_key(key: KeyEvent) -> Option<Action> {
    // Ctrl+] detaches from the session view; everything else goes to the pod.
    if key.code == KeyCode::Char(']') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::LeaveTerminal);
    }
    encode_key(key).map(Action::TerminalInput)
}

/// Encode a key event as the raw byte sequence a terminal would produce,
/// forwarded verbatim on the outbound channel.
pub fn encode_key(key: KeyEvent) -> Option<String> {
    let encoded = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                ((upper as u8 - b'A' + 1) as char).to_string()
            } else {
                return None;
            }
        }
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "\r".to_string(),
        KeyCode::Tab => "\t".to_string(),
        KeyCode::Backspace => "\x7f".to_string(),
        KeyCode::Esc => "\x1b".to_string(),
        KeyCode::Up => "\x1b[A".to_string(),
        KeyCode::Down => "\x1b[B".to_string(),
        KeyCode::Right => "\x1b[C".to_string(),
        KeyCode::Left => "\x1b[D".to_string(),
        KeyCode::Home => "\x1b[H".to_string(),
        KeyCode::End => "\x1b[F".to_string(),
        KeyCode::Delete => "\x1b[3~".to_string(),
        _ => return None,
    };
    Some(encoded)
}

#[cfg(test)]
mod tests {
    use super::{Action, encode_key, map_key};
    use crate::app::InputMode;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn normal_mode_maps_quit() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::Quit));
    }

    #[test]
    fn normal_mode_maps_digits_to_tabs() {
        let key = KeyEvent::new(KeyCode::Char('3'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::SwitchTab(2)));
        let key = KeyEvent::new(KeyCode::Char('5'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), None);
    }

    #[test]
    fn normal_mode_maps_slash_to_search() {
        let key = KeyEvent::new(KeyCode::Char('/'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::StartSearch));
    }

    #[test]
    fn search_mode_collects_chars_and_cancels() {
        let key = KeyEvent::new(KeyCode::Char('w'), KeyModifiers::NONE);
        assert_eq!(
            map_key(InputMode::Search, key),
            Some(Action::SearchChar('w'))
        );
        let key = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Search, key), Some(Action::CancelSearch));
    }

    #[test]
    fn terminal_mode_forwards_keystrokes_verbatim() {
        let key = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::NONE);
        assert_eq!(
            map_key(InputMode::Terminal, key),
            Some(Action::TerminalInput("l".to_string()))
        );
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(
            map_key(InputMode::Terminal, key),
            Some(Action::TerminalInput("\r".to_string()))
        );
    }

    #[test]
    fn terminal_mode_ctrl_bracket_detaches() {
        let key = KeyEvent::new(KeyCode::Char(']'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Terminal, key), Some(Action::LeaveTerminal));
    }

    #[test]
    fn encode_key_maps_control_sequences() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(encode_key(ctrl_c), Some("\x03".to_string()));
        let up = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(encode_key(up), Some("\x1b[A".to_string()));
        let backspace = KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE);
        assert_eq!(encode_key(backspace), Some("\x7f".to_string()));
    }
}
