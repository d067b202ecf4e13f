// Paginated messages.
//
// The paginator is pure state: which group and page are showing, and which
// buttons make sense. The Discord layer renders it as an embed with buttons
// and feeds button presses back in through `handle_interaction`.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

const CUSTOM_ID_PREFIX: &str = "paginator";

/// Discord's embed description limit is 4096; stay well under it.
pub const DEFAULT_PAGE_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: Option<String>,
    pub body: String,
    /// Extra footer text shown next to the page counter.
    pub footer_note: Option<String>,
}

impl Page {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
            footer_note: None,
        }
    }

    pub fn titled(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: body.into(),
            footer_note: None,
        }
    }

    pub fn with_footer_note(mut self, note: impl Into<String>) -> Self {
        self.footer_note = Some(note.into());
        self
    }
}

/// A named set of pages. Paginators with several groups get a button to
/// cycle between them (e.g. "Commands" / "Extensions").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGroup {
    pub name: String,
    pub pages: Vec<Page>,
}

impl PageGroup {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }

    /// Pages built from `lines`, packing as many whole lines as fit in
    /// `max_chars` onto each page. A line longer than `max_chars` gets a page
    /// to itself, truncated. Every page is titled `name`.
    pub fn from_lines<I, S>(name: &str, lines: I, max_chars: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let max_chars = max_chars.max(1);
        let mut pages = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for line in lines {
            let line = line.as_ref();
            let line_len = line.chars().count();

            if current_len > 0 && current_len + 1 + line_len > max_chars {
                pages.push(Page::titled(name, std::mem::take(&mut current)));
                current_len = 0;
            }

            if line_len > max_chars {
                let truncated: String = line.chars().take(max_chars.saturating_sub(1)).collect();
                pages.push(Page::titled(name, format!("{}…", truncated)));
                continue;
            }

            if current_len > 0 {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }

        if current_len > 0 || pages.is_empty() {
            pages.push(Page::titled(name, current));
        }

        Self::new(name, pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginatorAction {
    First,
    Previous,
    Next,
    Last,
    NextGroup,
    Stop,
}

impl PaginatorAction {
    pub const ALL: [PaginatorAction; 6] = [
        PaginatorAction::First,
        PaginatorAction::Previous,
        PaginatorAction::Next,
        PaginatorAction::Last,
        PaginatorAction::NextGroup,
        PaginatorAction::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaginatorAction::First => "first",
            PaginatorAction::Previous => "prev",
            PaginatorAction::Next => "next",
            PaginatorAction::Last => "last",
            PaginatorAction::NextGroup => "group",
            PaginatorAction::Stop => "stop",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }
}

/// A button the view should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatorButton {
    pub action: PaginatorAction,
    pub custom_id: String,
    pub disabled: bool,
}

/// Result of feeding a button press to the paginator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorUpdate {
    /// The button belongs to another paginator.
    Ignored,
    /// Someone other than the owner pressed it; nothing changed.
    NotOwner,
    Changed,
    Unchanged,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("A paginator needs at least one page group")]
    NoGroups,

    #[error("Page group `{0}` has no pages")]
    EmptyGroup(String),
}

#[derive(Debug, Clone)]
pub struct Paginator {
    id: String,
    groups: Vec<PageGroup>,
    group: usize,
    page: usize,
    wrap: bool,
    owner: Option<u64>,
    timeout: Duration,
    stopped: bool,
}

impl Paginator {
    pub fn new(groups: Vec<PageGroup>) -> Result<Self, PaginationError> {
        if groups.is_empty() {
            return Err(PaginationError::NoGroups);
        }
        if let Some(empty) = groups.iter().find(|g| g.pages.is_empty()) {
            return Err(PaginationError::EmptyGroup(empty.name.clone()));
        }

        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();

        Ok(Self {
            id,
            groups,
            group: 0,
            page: 0,
            wrap: false,
            owner: None,
            timeout: Duration::from_secs(120),
            stopped: false,
        })
    }

    /// A single group built with [`PageGroup::from_lines`].
    pub fn from_lines<I, S>(
        title: &str,
        lines: I,
        max_chars: usize,
    ) -> Result<Self, PaginationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(vec![PageGroup::from_lines(title, lines, max_chars)])
    }

    pub fn with_owner(mut self, user_id: u64) -> Self {
        self.owner = Some(user_id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Previous on the first page goes to the last, and Next on the last goes
    /// to the first.
    pub fn wrap_around(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn pages(&self) -> &[Page] {
        &self.groups[self.group].pages
    }

    pub fn current(&self) -> &Page {
        &self.pages()[self.page]
    }

    /// 1-based.
    pub fn page_number(&self) -> usize {
        self.page + 1
    }

    pub fn page_count(&self) -> usize {
        self.pages().len()
    }

    pub fn group_name(&self) -> &str {
        &self.groups[self.group].name
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_single_page(&self) -> bool {
        self.groups.len() == 1 && self.groups[0].pages.len() == 1
    }

    /// Apply an action. Returns whether the visible page changed.
    pub fn apply(&mut self, action: PaginatorAction) -> bool {
        let before = (self.group, self.page);
        let last = self.page_count() - 1;

        match action {
            PaginatorAction::First => self.page = 0,
            PaginatorAction::Last => self.page = last,
            PaginatorAction::Previous => {
                if self.page > 0 {
                    self.page -= 1;
                } else if self.wrap {
                    self.page = last;
                }
            }
            PaginatorAction::Next => {
                if self.page < last {
                    self.page += 1;
                } else if self.wrap {
                    self.page = 0;
                }
            }
            PaginatorAction::NextGroup => {
                self.group = (self.group + 1) % self.groups.len();
                self.page = 0;
            }
            PaginatorAction::Stop => {
                self.stopped = true;
                return false;
            }
        }

        before != (self.group, self.page)
    }

    pub fn custom_id(&self, action: PaginatorAction) -> String {
        format!("{}:{}:{}", CUSTOM_ID_PREFIX, self.id, action.as_str())
    }

    /// Buttons to render for the current state. Empty for a single page.
    pub fn buttons(&self) -> Vec<PaginatorButton> {
        if self.is_single_page() {
            return Vec::new();
        }

        let at_start = self.page == 0;
        let at_end = self.page + 1 == self.page_count();
        let single = self.page_count() == 1;

        let mut buttons = Vec::new();
        let mut push = |action: PaginatorAction, disabled: bool| {
            buttons.push(PaginatorButton {
                action,
                custom_id: self.custom_id(action),
                disabled: disabled || self.stopped,
            });
        };

        push(PaginatorAction::First, at_start);
        push(PaginatorAction::Previous, single || (at_start && !self.wrap));
        push(PaginatorAction::Next, single || (at_end && !self.wrap));
        push(PaginatorAction::Last, at_end);
        if self.groups.len() > 1 {
            push(PaginatorAction::NextGroup, false);
        }
        push(PaginatorAction::Stop, false);
        buttons
    }

    pub fn can_interact(&self, user_id: u64) -> bool {
        self.owner.map_or(true, |owner| owner == user_id)
    }

    /// Handle a button press by `user_id`.
    pub fn handle_interaction(&mut self, user_id: u64, custom_id: &str) -> PaginatorUpdate {
        let action = match parse_action(custom_id) {
            Some((instance, action)) if instance == self.id => action,
            _ => return PaginatorUpdate::Ignored,
        };

        if !self.can_interact(user_id) {
            return PaginatorUpdate::NotOwner;
        }

        if self.apply(action) {
            PaginatorUpdate::Changed
        } else if self.stopped {
            PaginatorUpdate::Stopped
        } else {
            PaginatorUpdate::Unchanged
        }
    }
}

/// Split `paginator:<instance>:<action>` into its instance id and action.
pub fn parse_action(custom_id: &str) -> Option<(&str, PaginatorAction)> {
    let rest = custom_id.strip_prefix(CUSTOM_ID_PREFIX)?.strip_prefix(':')?;
    let (instance, action) = rest.rsplit_once(':')?;
    if instance.is_empty() {
        return None;
    }
    Some((instance, PaginatorAction::parse(action)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> Paginator {
        Paginator::new(vec![PageGroup::new(
            "Numbers",
            vec![Page::new("one"), Page::new("two"), Page::new("three")],
        )])
        .unwrap()
    }

    #[test]
    fn navigation_clamps_without_wrap() {
        let mut p = three_pages();
        assert!(!p.apply(PaginatorAction::Previous));
        assert!(p.apply(PaginatorAction::Next));
        assert_eq!(p.current().body, "two");
        assert!(p.apply(PaginatorAction::Last));
        assert!(!p.apply(PaginatorAction::Next));
        assert_eq!(p.page_number(), 3);
        assert!(p.apply(PaginatorAction::First));
        assert_eq!(p.page_number(), 1);
    }

    #[test]
    fn navigation_wraps_when_enabled() {
        let mut p = three_pages().wrap_around(true);
        assert!(p.apply(PaginatorAction::Previous));
        assert_eq!(p.current().body, "three");
        assert!(p.apply(PaginatorAction::Next));
        assert_eq!(p.current().body, "one");
    }

    #[test]
    fn group_switch_resets_page() {
        let mut p = Paginator::new(vec![
            PageGroup::new("A", vec![Page::new("a1"), Page::new("a2")]),
            PageGroup::new("B", vec![Page::new("b1")]),
        ])
        .unwrap();

        p.apply(PaginatorAction::Next);
        assert!(p.apply(PaginatorAction::NextGroup));
        assert_eq!(p.group_name(), "B");
        assert_eq!(p.current().body, "b1");
        assert!(p.apply(PaginatorAction::NextGroup));
        assert_eq!(p.current().body, "a1");
    }

    #[test]
    fn rejects_empty_groups() {
        assert_eq!(Paginator::new(vec![]).unwrap_err(), PaginationError::NoGroups);
        assert_eq!(
            Paginator::new(vec![PageGroup::new("Empty", vec![])]).unwrap_err(),
            PaginationError::EmptyGroup("Empty".into())
        );
    }

    #[test]
    fn buttons_reflect_position() {
        let mut p = three_pages();
        let disabled: Vec<_> = p.buttons().iter().map(|b| b.disabled).collect();
        // first, prev, next, last, stop
        assert_eq!(disabled, vec![true, true, false, false, false]);

        p.apply(PaginatorAction::Last);
        let disabled: Vec<_> = p.buttons().iter().map(|b| b.disabled).collect();
        assert_eq!(disabled, vec![false, false, true, true, false]);

        let single = Paginator::from_lines("One", ["just this"], 100).unwrap();
        assert!(single.is_single_page());
        assert!(single.buttons().is_empty());
    }

    #[test]
    fn from_lines_packs_whole_lines() {
        let lines = ["aaaa", "bbbb", "cccc", "dddddddddddd"];
        let p = Paginator::from_lines("Lines", lines, 9).unwrap();
        assert_eq!(p.page_count(), 3);
        assert_eq!(p.current().body, "aaaa\nbbbb");
        assert_eq!(p.current().title.as_deref(), Some("Lines"));

        let mut p = p;
        p.apply(PaginatorAction::Next);
        assert_eq!(p.current().body, "cccc");
        p.apply(PaginatorAction::Next);
        assert_eq!(p.current().body, "dddddddd…");
    }

    #[test]
    fn from_lines_with_nothing_gives_one_empty_page() {
        let p = Paginator::from_lines("Empty", Vec::<String>::new(), 100).unwrap();
        assert_eq!(p.page_count(), 1);
        assert_eq!(p.current().body, "");
    }

    #[test]
    fn custom_ids_round_trip_and_route_by_instance() {
        let mut p = three_pages().with_owner(7);
        let next = p.custom_id(PaginatorAction::Next);
        assert_eq!(parse_action(&next), Some((p.id(), PaginatorAction::Next)));
        assert_eq!(parse_action("paginator::next"), None);
        assert_eq!(parse_action("poll:abc:yes"), None);

        assert_eq!(
            p.handle_interaction(7, "paginator:someoneelse:next"),
            PaginatorUpdate::Ignored
        );
        assert_eq!(p.handle_interaction(8, &next), PaginatorUpdate::NotOwner);
        assert_eq!(p.page_number(), 1);
        assert_eq!(p.handle_interaction(7, &next), PaginatorUpdate::Changed);

        let stop = p.custom_id(PaginatorAction::Stop);
        assert_eq!(p.handle_interaction(7, &stop), PaginatorUpdate::Stopped);
        assert!(p.buttons().iter().all(|b| b.disabled));
    }
}
