//! Tarjan's algorithm for finding strongly connected components.
//!
//! The graph is implicit: callers pass the start vertices and a function that
//! yields the successors of a vertex, so only the part of the graph reachable
//! from the start vertices is ever visited. The depth-first search keeps its own
//! frame stack; graph depth never becomes call-stack depth.
//!
//! Discovery index, low-link and on-stack flags live in a side table owned by
//! one [`Tarjan`] value, so nothing leaks from one search into the next.

use hashbrown::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy)]
struct VertexState {
    index: usize,
    lowlink: usize,
    on_stack: bool,
}

/// Implements Tarjan's algorithm for finding strongly connected components.
#[derive(Debug)]
pub struct Tarjan<T> {
    /// Per-vertex search state, keyed by vertex identity.
    vertices: HashMap<T, VertexState>,
    /// Vertices of components that are not complete yet.
    stack: Vec<T>,
    /// The next discovery index.
    next_index: usize,
}

impl<T> Tarjan<T>
where
    T: Eq + Hash + Copy,
{
    /// Creates a new Tarjan algorithm instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: HashMap::new(),
            stack: Vec::new(),
            next_index: 0,
        }
    }

    /// Finds the strongly connected components reachable from `roots`.
    ///
    /// Components come out in reverse topological order: every component is
    /// emitted after all components reachable from it. Vertices already visited
    /// by an earlier call on the same instance are skipped.
    pub fn find_components<R, F, I>(&mut self, roots: R, mut successors: F) -> Vec<Vec<T>>
    where
        R: IntoIterator<Item = T>,
        F: FnMut(&T) -> I,
        I: IntoIterator<Item = T>,
    {
        let mut components = Vec::new();

        for root in roots {
            if self.vertices.contains_key(&root) {
                continue;
            }

            self.discover(root);
            let mut frames = vec![(root, successors(&root).into_iter())];

            while let Some(frame) = frames.last_mut() {
                let vertex = frame.0;
                match frame.1.next() {
                    Some(successor) => match self.vertices.get(&successor).copied() {
                        None => {
                            self.discover(successor);
                            let next = successors(&successor).into_iter();
                            frames.push((successor, next));
                        }
                        Some(state) if state.on_stack => self.lower(vertex, state.index),
                        Some(_) => {}
                    },
                    None => {
                        frames.pop();
                        let Some(state) = self.vertices.get(&vertex).copied() else {
                            continue;
                        };
                        if let Some(&(parent, _)) = frames.last() {
                            self.lower(parent, state.lowlink);
                        }
                        if state.lowlink == state.index {
                            components.push(self.pop_component(vertex));
                        }
                    }
                }
            }
        }

        components
    }

    /// Number of vertices visited so far.
    #[must_use]
    pub fn visited(&self) -> usize {
        self.vertices.len()
    }

    fn discover(&mut self, vertex: T) {
        let index = self.next_index;
        self.next_index += 1;
        self.vertices.insert(
            vertex,
            VertexState {
                index,
                lowlink: index,
                on_stack: true,
            },
        );
        self.stack.push(vertex);
    }

    fn lower(&mut self, vertex: T, value: usize) {
        if let Some(state) = self.vertices.get_mut(&vertex) {
            state.lowlink = state.lowlink.min(value);
        }
    }

    fn pop_component(&mut self, root: T) -> Vec<T> {
        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            if let Some(state) = self.vertices.get_mut(&member) {
                state.on_stack = false;
            }
            component.push(member);
            if member == root {
                break;
            }
        }
        component
    }
}

impl<T> Default for Tarjan<T>
where
    T: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}
