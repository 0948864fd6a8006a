use crate::fuzzy;
use crate::input::Action;
use crate::model::Instance;

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PickerCommand {
    None,
    Confirm(usize),
    Cancel,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PickerRow {
    pub label: String,
    pub namespace: String,
    pub phase: String,
    pub node: String,
    pub age: String,
}

impl PickerRow {
    pub fn from_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

impl From<&Instance> for PickerRow {
    fn from(instance: &Instance) -> Self {
        Self {
            namespace: instance.namespace.clone(),
            phase: instance.phase.title().to_string(),
            node: instance.node.clone(),
            age: instance.age.clone(),
            ..Self::from_label(instance.label())
        }
    }
}

#[derive(Debug, Clone)]
pub struct PickerHeader {
    pub cluster: String,
    pub context: String,
    pub captured_at: String,
}

/// Picker state: the candidate rows, the query typed so far and the ranked
/// view derived from both. `selected` indexes into `ranked`, never into
/// `rows`.
#[derive(Debug, Clone)]
pub struct PickerApp {
    header: Option<PickerHeader>,
    rows: Vec<PickerRow>,
    labels: Vec<String>,
    query: String,
    ranked: Vec<usize>,
    selected: usize,
    page_size: usize,
}

impl PickerApp {
    pub fn new(rows: Vec<PickerRow>) -> Self {
        let labels = rows.iter().map(|row| row.label.clone()).collect::<Vec<_>>();
        let ranked = (0..rows.len()).collect();
        Self {
            header: None,
            rows,
            labels,
            query: String::new(),
            ranked,
            selected: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_header(mut self, header: PickerHeader) -> Self {
        self.header = Some(header);
        self
    }

    pub fn header(&self) -> Option<&PickerHeader> {
        self.header.as_ref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn matched(&self) -> usize {
        self.ranked.len()
    }

    /// Rows in ranked order, paired with their original index.
    pub fn visible_rows(&self) -> impl Iterator<Item = (usize, &PickerRow)> {
        self.ranked.iter().map(|&index| (index, &self.rows[index]))
    }

    pub fn selected_position(&self) -> Option<usize> {
        if self.ranked.is_empty() {
            None
        } else {
            Some(self.selected)
        }
    }

    /// Original index of the highlighted row.
    pub fn selected_index(&self) -> Option<usize> {
        self.ranked.get(self.selected).copied()
    }

    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
    }

    pub fn apply_action(&mut self, action: Action) -> PickerCommand {
        match action {
            Action::Cancel => return PickerCommand::Cancel,
            Action::EndOfInput => {
                if self.query.is_empty() {
                    return PickerCommand::Cancel;
                }
            }
            Action::Submit => {
                if let Some(index) = self.selected_index() {
                    return PickerCommand::Confirm(index);
                }
            }
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::PageDown => self.move_selection(self.page_size as isize),
            Action::PageUp => self.move_selection(-(self.page_size as isize)),
            Action::Top => self.selected = 0,
            Action::Bottom => self.selected = self.ranked.len().saturating_sub(1),
            Action::Backspace => {
                if self.query.pop().is_some() {
                    self.rerank();
                }
            }
            Action::DeleteWord => {
                let trimmed = self.query.trim_end().len();
                let cut = self.query[..trimmed]
                    .rfind(char::is_whitespace)
                    .map(|position| position + 1)
                    .unwrap_or(0);
                if cut != self.query.len() {
                    self.query.truncate(cut);
                    self.rerank();
                }
            }
            Action::ClearQuery => {
                if !self.query.is_empty() {
                    self.query.clear();
                    self.rerank();
                }
            }
            Action::InputChar(c) => {
                self.query.push(c);
                self.rerank();
            }
        }

        PickerCommand::None
    }

    fn move_selection(&mut self, delta: isize) {
        if self.ranked.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.ranked.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    fn rerank(&mut self) {
        self.ranked = fuzzy::rank(&self.labels, &self.query);
        self.selected = 0;
    }
}
