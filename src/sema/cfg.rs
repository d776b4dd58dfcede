//! Control-flow graph checker
//!
//! Walks one function body before any code is emitted for it. Every statement
//! gets a label and an edge to its static successor; statements without a
//! successor are terminals. The body is complete when every terminal is a
//! `return`, and it needs a shared exit block when more than one `return`
//! terminates it.

use std::collections::HashMap;
use std::fmt::Write;

use log::trace;

use crate::frontend::ast::{Ast, NodeId, NodeKind};

pub struct CfgChecker<'a> {
    ast: &'a Ast,
    name: String,
    labels: HashMap<NodeId, usize>,
    order: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    terminals: Vec<NodeId>,
    /// The body is empty, so control runs straight off its end
    falls_off_end: bool,
}

impl<'a> CfgChecker<'a> {
    /// Build the graph of the `StatList` `body`
    pub fn check(ast: &'a Ast, name: &str, body: NodeId) -> Self {
        let mut checker = Self {
            ast,
            name: name.to_string(),
            labels: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            terminals: Vec::new(),
            falls_off_end: false,
        };
        let stmts = ast.stmts(body);
        if stmts.is_empty() {
            checker.falls_off_end = true;
        } else {
            checker.walk_list(stmts, None);
        }
        checker
    }

    /// Every terminal is a return
    pub fn is_complete(&self) -> bool {
        !self.falls_off_end && self.terminals.iter().all(|&n| self.is_return(n))
    }

    /// More than one return terminates the body
    pub fn needs_merge_block(&self) -> bool {
        self.return_count() > 1
    }

    pub fn return_count(&self) -> usize {
        self.terminals.iter().filter(|&&n| self.is_return(n)).count()
    }

    pub fn terminals(&self) -> &[NodeId] {
        &self.terminals
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    fn is_return(&self, node: NodeId) -> bool {
        matches!(self.ast.kind(node), NodeKind::Return { .. })
    }

    /// Visit a statement sequence whose last statement continues at `cont`.
    /// Returns whether control can leave the sequence at its end.
    fn walk_list(&mut self, stmts: &[NodeId], cont: Option<NodeId>) -> bool {
        for (i, &stmt) in stmts.iter().enumerate() {
            let next = stmts.get(i + 1).copied().or(cont);
            if !self.visit(stmt, next) {
                return false;
            }
        }
        true
    }

    fn visit(&mut self, node: NodeId, next: Option<NodeId>) -> bool {
        if self.labels.contains_key(&node) {
            return true;
        }
        self.labels.insert(node, self.order.len());
        self.order.push(node);

        match self.ast.kind(node) {
            NodeKind::Return { .. } => {
                self.terminals.push(node);
                false
            }
            NodeKind::If { then_body, else_body, .. } => {
                let (then_body, else_body) = (*then_body, *else_body);
                let then_falls = self.visit_branch(node, then_body, next);
                let else_falls = match else_body {
                    Some(else_body) => self.visit_branch(node, else_body, next),
                    None => {
                        self.link(node, next);
                        true
                    }
                };
                then_falls || else_falls
            }
            NodeKind::StatList { .. } => self.visit_branch(node, node, next),
            NodeKind::Loop { body, .. } => {
                let body = *body;
                let stmts = self.ast.stmts(body);
                if let Some(&first) = stmts.first() {
                    self.edge(node, first);
                    self.walk_list(stmts, Some(node));
                }
                // The guard can always fail
                self.link(node, next);
                true
            }
            _ => {
                self.link(node, next);
                true
            }
        }
    }

    fn visit_branch(&mut self, parent: NodeId, branch: NodeId, next: Option<NodeId>) -> bool {
        let stmts = self.ast.stmts(branch);
        match stmts.first() {
            Some(&first) => {
                self.edge(parent, first);
                self.walk_list(stmts, next)
            }
            None => {
                self.link(parent, next);
                true
            }
        }
    }

    fn edge(&mut self, from: NodeId, to: NodeId) {
        trace!("cfg {}: {} -> {}", self.name, from, to);
        self.edges.push((from, to));
    }

    /// Edge to `next`, or record `node` as a terminal when there is none
    fn link(&mut self, node: NodeId, next: Option<NodeId>) {
        match next {
            Some(next) => self.edge(node, next),
            None => {
                if !self.terminals.contains(&node) {
                    self.terminals.push(node);
                }
            }
        }
    }

    /// Graphviz description of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        writeln!(out, "digraph \"{}\" {{", self.name).unwrap();
        for &node in &self.order {
            let shape = if self.terminals.contains(&node) { "doublecircle" } else { "box" };
            writeln!(
                out,
                "  {} [label=\"{}: {}\", shape={}];",
                node,
                self.labels[&node],
                self.ast.kind(node).tag(),
                shape
            )
            .unwrap();
        }
        for (from, to) in &self.edges {
            writeln!(out, "  {} -> {};", from, to).unwrap();
        }
        writeln!(out, "}}").unwrap();
        out
    }
}
