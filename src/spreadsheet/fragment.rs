//! Owned XML event runs kept verbatim around the parsed part of a worksheet.
//!
//! A worksheet is split into the events before `<sheetData>` (the head) and
//! the events after `</sheetData>` (the tail). Both are edited in place at the
//! element level so everything the indexer does not understand round-trips.

use crate::error::ContainerError;
use crate::helpers::xml::build_element;
use crate::helpers::xml::Attributes;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesText;
use quick_xml::events::Event;

/// Position of one element inside a fragment, `end` being the index of its
/// end event (or `start` itself for an empty element)
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// A run of owned events that starts `depth` levels inside the root element
#[derive(Clone, Debug, Default)]
pub(crate) struct Fragment {
    events: Vec<Event<'static>>,
    depth: usize,
}

impl Fragment {
    pub(crate) fn new(depth: usize) -> Fragment {
        Fragment { events: Vec::new(), depth }
    }

    pub(crate) fn push(&mut self, event: Event<'static>) {
        self.events.push(event);
    }

    pub(crate) fn events(&self) -> &[Event<'static>] {
        &self.events
    }

    /// Spans of the direct children of the root element, in document order
    pub(crate) fn children(&self) -> Vec<(Span, String)> {
        let mut children = Vec::new();
        let mut depth = self.depth;
        let mut open: Option<(usize, String)> = None;
        for (index, event) in self.events.iter().enumerate() {
            match event {
                Event::Start(element) => {
                    if depth == 1 {
                        open = Some((index, element_name(element.name().as_ref())));
                    }
                    depth += 1;
                }
                Event::Empty(element) if depth == 1 => {
                    children.push((Span { start: index, end: index }, element_name(element.name().as_ref())));
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 {
                        if let Some((start, name)) = open.take() {
                            children.push((Span { start, end: index }, name));
                        }
                    }
                }
                _ => (),
            }
        }
        children
    }

    /// Finds the first direct child of the root with the given name
    pub(crate) fn find(&self, name: &str) -> Option<Span> {
        self.children()
            .into_iter()
            .find(|(_, child)| child == name)
            .map(|(span, _)| span)
    }

    /// Finds every element with the given name at any depth
    pub(crate) fn find_all(&self, name: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut stack: Vec<(usize, bool)> = Vec::new();
        for (index, event) in self.events.iter().enumerate() {
            match event {
                Event::Start(element) => stack.push((index, element.name().as_ref() == name.as_bytes())),
                Event::Empty(element) if element.name().as_ref() == name.as_bytes() => {
                    spans.push(Span { start: index, end: index });
                }
                Event::End(_) => {
                    if let Some((start, true)) = stack.pop() {
                        spans.push(Span { start, end: index });
                    }
                }
                _ => (),
            }
        }
        spans.sort_by_key(|span| span.start);
        spans
    }

    /// Events of one element, both ends included
    pub(crate) fn slice(&self, span: Span) -> &[Event<'static>] {
        &self.events[span.start..=span.end]
    }

    /// Replaces an element with another run of events
    pub(crate) fn replace(&mut self, span: Span, events: Vec<Event<'static>>) {
        self.events.splice(span.start..=span.end, events);
    }

    /// Removes an element and its children
    pub(crate) fn remove(&mut self, span: Span) {
        self.events.drain(span.start..=span.end);
    }

    /// Inserts events as a direct child of the root, before the first child
    /// named in `followers`. Without such a child the events go last.
    pub(crate) fn insert_before(&mut self, followers: &[&str], events: Vec<Event<'static>>) {
        let position = self
            .children()
            .into_iter()
            .find(|(_, name)| followers.contains(&name.as_str()))
            .map(|(span, _)| span.start)
            .unwrap_or_else(|| self.closing_position());
        self.events.splice(position..position, events);
    }

    /// Index of the event that closes the root, or the end of the fragment
    fn closing_position(&self) -> usize {
        let mut depth = self.depth;
        for (index, event) in self.events.iter().enumerate() {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return index;
                    }
                }
                _ => (),
            }
        }
        self.events.len()
    }

    /// Applies `edit` to the attributes of every element; elements for which
    /// it returns true are rebuilt with the edited attributes
    pub(crate) fn edit_attributes<F>(&mut self, mut edit: F) -> Result<(), ContainerError>
    where
        F: FnMut(&str, &mut Attributes) -> bool,
    {
        for event in self.events.iter_mut() {
            let (element, is_empty) = match event {
                Event::Start(element) => (element, false),
                Event::Empty(element) => (element, true),
                _ => continue,
            };
            let name = element.owned_name()?;
            let mut attributes = element.owned_attributes()?;
            if edit(&name, &mut attributes) {
                let rebuilt = build_element(&name, &attributes);
                *event = if is_empty { Event::Empty(rebuilt) } else { Event::Start(rebuilt) };
            }
        }
        Ok(())
    }

    /// Rewrites the text content of every element named in `names`
    pub(crate) fn edit_text<F>(&mut self, names: &[&str], edit: F) -> Result<(), ContainerError>
    where
        F: Fn(&str) -> String,
    {
        let mut spans = Vec::new();
        for name in names {
            spans.extend(self.find_all(name).into_iter().filter(|span| span.end > span.start));
        }
        // back to front keeps earlier indexes valid
        spans.sort_by_key(|span| std::cmp::Reverse(span.start));
        for span in spans {
            let mut text = String::new();
            for event in &self.events[span.start + 1..span.end] {
                match event {
                    Event::Text(event) => text.push_bytes_text(event)?,
                    Event::GeneralRef(event) => text.push_bytes_ref(event)?,
                    Event::CData(event) => text.push_str(&event.xml_content()?),
                    _ => (),
                }
            }
            let shifted = edit(&text);
            self.events.splice(
                span.start + 1..span.end,
                [Event::Text(BytesText::new(&shifted).into_owned())],
            );
        }
        Ok(())
    }
}

/// Builds `<name attr="..."/>`
pub(crate) fn empty_element(name: &str, attributes: &[(String, String)]) -> Event<'static> {
    Event::Empty(build_element(name, attributes))
}

/// Builds `<name attr="...">` ... `</name>` around `children`
pub(crate) fn wrap_element(name: &str, attributes: &[(String, String)], children: Vec<Event<'static>>) -> Vec<Event<'static>> {
    let mut events = Vec::with_capacity(children.len() + 2);
    events.push(Event::Start(build_element(name, attributes)));
    events.extend(children);
    events.push(Event::End(BytesEnd::new(name.to_owned())));
    events
}

fn element_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
