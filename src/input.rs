use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Cancel,
    Submit,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    Backspace,
    DeleteWord,
    ClearQuery,
    /// Ctrl-D: cancels on an empty query, otherwise ignored.
    EndOfInput,
    InputChar(char),
}

pub fn map_key(key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => Some(Action::Cancel),
        KeyCode::Enter => Some(Action::Submit),
        KeyCode::Char('c') if ctrl => Some(Action::Cancel),
        KeyCode::Char('d') if ctrl => Some(Action::EndOfInput),
        KeyCode::Char('m') if ctrl => Some(Action::Submit),
        KeyCode::Char('n') | KeyCode::Char('j') if ctrl => Some(Action::Down),
        KeyCode::Char('p') | KeyCode::Char('k') if ctrl => Some(Action::Up),
        KeyCode::Char('u') if ctrl => Some(Action::ClearQuery),
        KeyCode::Char('w') if ctrl => Some(Action::DeleteWord),
        KeyCode::Char('h') if ctrl => Some(Action::Backspace),
        KeyCode::Char(_) if ctrl || key.modifiers.contains(KeyModifiers::ALT) => None,
        KeyCode::Char(c) => Some(Action::InputChar(c)),
        KeyCode::Backspace if ctrl || key.modifiers.contains(KeyModifiers::ALT) => {
            Some(Action::DeleteWord)
        }
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Down | KeyCode::Tab => Some(Action::Down),
        KeyCode::Up | KeyCode::BackTab => Some(Action::Up),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Home => Some(Action::Top),
        KeyCode::End => Some(Action::Bottom),
        _ => None,
    }
}
