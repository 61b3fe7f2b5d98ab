//! Dotted-path resolution over mapped graphs
//!
//! `resolve` reads the value at a path such as `"address.city"` or
//! `"members.0.name"`; `assign` writes one. Object and instance segments are
//! keys, array and collection segments are decimal indices.
//!
//! Resolution is forgiving: a missing or null segment yields `None`.
//! Assignment is not: every intermediate segment must already exist, and the
//! first one that doesn't raises `PathError::MissingSegment`. Nothing is ever
//! created along the way.
//!
//! Instance and collection locks are never held while descending into another
//! handle, so a graph that refers back to itself cannot deadlock a walk.

use crate::collection::Collection;
use crate::error::PathError;
use crate::instance::Instance;
use crate::node::{Fields, Node};

pub const SEPARATOR: char = '.';

/// Split a path into its segments, rejecting the empty path
pub fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }
    Ok(path.split(SEPARATOR).collect())
}

/// Join a parent path and a child path with the separator
pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}{SEPARATOR}{child}"),
    }
}

/// Read the node at `path`, or `None` if any segment is absent or null
pub fn resolve(root: &Node, path: &str) -> Option<Node> {
    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    resolve_segments(root, &segments)
}

pub(crate) fn resolve_segments(node: &Node, segments: &[&str]) -> Option<Node> {
    let Some((head, rest)) = segments.split_first() else {
        return present(node.clone());
    };

    match node {
        Node::Object(fields) => resolve_segments(fields.get(*head)?, rest),
        Node::Array(items) => resolve_segments(items.get(parse_index(head)?)?, rest),
        Node::Instance(instance) => {
            let child = instance.field(head)?;
            resolve_segments(&child, rest)
        }
        Node::Collection(collection) => {
            let element = collection.get(parse_index(head)?)?;
            resolve_segments(&Node::Instance(element), rest)
        }
        Node::Value(value) => {
            // Tolerate hand-built nodes that carry raw containers.
            if value.is_object() || value.is_array() {
                resolve_segments(&Node::from(value.clone()), segments)
            } else {
                None
            }
        }
    }
}

/// Write `value` at `path`. Intermediate segments must already exist.
pub fn assign(root: &mut Node, path: &str, value: Node) -> Result<(), PathError> {
    let segments = segments(path)?;
    assign_segments(root, &segments, path, value)
}

/// Where a write lands after walking the plain (lock-free) part of a path
enum Target<'n> {
    /// The container that receives the terminal segment
    Slot(&'n mut Node),
    /// A shared handle reached after `usize` segments; the write continues
    /// inside it
    Handle(Handle, usize),
}

enum Handle {
    Instance(Instance),
    Collection(Collection),
}

pub(crate) fn assign_segments(
    root: &mut Node,
    segments: &[&str],
    path: &str,
    value: Node,
) -> Result<(), PathError> {
    match descend(root, segments, path)? {
        Target::Slot(container) => write_terminal(container, segments[segments.len() - 1], path, value),
        Target::Handle(handle, consumed) => assign_through(handle, &segments[consumed..], path, value),
    }
}

/// A write that reached a shared handle and must continue inside it
pub(crate) struct Pending {
    handle: Handle,
    segments: Vec<String>,
    value: Node,
}

impl Pending {
    /// Finish the write. Call only after releasing the lock that produced it.
    pub(crate) fn finish(self, path: &str) -> Result<(), PathError> {
        let segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        assign_through(self.handle, &segments, path, self.value)
    }
}

/// Assignment rooted at an instance's field map. Called with the instance's
/// write lock held; any handle reached on the way comes back as `Pending`.
pub(crate) fn assign_in_fields(
    fields: &mut Fields,
    segments: &[&str],
    path: &str,
    value: Node,
) -> Result<Option<Pending>, PathError> {
    let (head, rest) = segments.split_first().ok_or(PathError::EmptyPath)?;

    if rest.is_empty() {
        fields.insert((*head).to_string(), value);
        return Ok(None);
    }

    let child = fields
        .get_mut(*head)
        .filter(|child| !child.is_absent())
        .ok_or_else(|| missing(path, head))?;

    match descend(child, rest, path)? {
        Target::Slot(container) => {
            write_terminal(container, rest[rest.len() - 1], path, value)?;
            Ok(None)
        }
        Target::Handle(handle, consumed) => Ok(Some(Pending {
            handle,
            segments: rest[consumed..].iter().map(|s| (*s).to_string()).collect(),
            value,
        })),
    }
}

fn assign_through(
    handle: Handle,
    segments: &[&str],
    path: &str,
    value: Node,
) -> Result<(), PathError> {
    match handle {
        Handle::Instance(instance) => instance.assign_segments(segments, path, value),
        Handle::Collection(collection) => {
            let (index, element) = collection_element(&collection, segments[0], path)?;
            if segments.len() == 1 {
                let Node::Instance(replacement) = value else {
                    return Err(PathError::NotAnInstance {
                        path: path.to_string(),
                    });
                };
                collection.replace_at(index, replacement);
                return Ok(());
            }
            element.assign_segments(&segments[1..], path, value)
        }
    }
}

/// Walk every segment but the last through plain objects and arrays.
/// Stops early at the first instance or collection handle.
fn descend<'n>(
    mut node: &'n mut Node,
    segments: &[&str],
    path: &str,
) -> Result<Target<'n>, PathError> {
    let last = segments.len() - 1;

    for (depth, segment) in segments.iter().enumerate() {
        match node {
            Node::Instance(instance) => {
                return Ok(Target::Handle(Handle::Instance(instance.clone()), depth))
            }
            Node::Collection(collection) => {
                return Ok(Target::Handle(Handle::Collection(collection.clone()), depth))
            }
            _ => {}
        }
        if depth == last {
            break;
        }
        node = step_mut(node, segment, path)?;
    }

    Ok(Target::Slot(node))
}

fn step_mut<'n>(node: &'n mut Node, segment: &str, path: &str) -> Result<&'n mut Node, PathError> {
    reparse_raw_container(node);
    match node {
        Node::Object(fields) => fields
            .get_mut(segment)
            .filter(|child| !child.is_absent())
            .ok_or_else(|| missing(path, segment)),
        Node::Array(items) => {
            let index = parse_index(segment).ok_or_else(|| not_container(path, segment))?;
            let len = items.len();
            let child = items.get_mut(index).ok_or_else(|| PathError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len,
            })?;
            if child.is_absent() {
                return Err(missing(path, segment));
            }
            Ok(child)
        }
        Node::Value(value) if value.is_null() => Err(missing(path, segment)),
        _ => Err(not_container(path, segment)),
    }
}

fn write_terminal(container: &mut Node, segment: &str, path: &str, value: Node) -> Result<(), PathError> {
    reparse_raw_container(container);
    match container {
        Node::Object(fields) => {
            fields.insert(segment.to_string(), value);
            Ok(())
        }
        Node::Array(items) => {
            let index = parse_index(segment).ok_or_else(|| not_container(path, segment))?;
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| PathError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len,
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(not_container(path, segment)),
    }
}

/// Hand-built nodes may carry raw JSON containers; turn them into plain
/// nodes before writing through them.
fn reparse_raw_container(node: &mut Node) {
    if let Node::Value(raw) = node {
        if raw.is_object() || raw.is_array() {
            let raw = std::mem::take(raw);
            *node = Node::from(raw);
        }
    }
}

fn collection_element(
    collection: &Collection,
    segment: &str,
    path: &str,
) -> Result<(usize, Instance), PathError> {
    let index = parse_index(segment).ok_or_else(|| not_container(path, segment))?;
    let element = collection.get(index).ok_or_else(|| PathError::IndexOutOfBounds {
        path: path.to_string(),
        index,
        len: collection.len(),
    })?;
    Ok((index, element))
}

fn present(node: Node) -> Option<Node> {
    if node.is_absent() {
        None
    } else {
        Some(node)
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    segment.parse().ok()
}

fn missing(path: &str, segment: &str) -> PathError {
    PathError::MissingSegment {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

fn not_container(path: &str, segment: &str) -> PathError {
    PathError::NotAContainer {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}
