//! Cycle analysis over the connection set
//!
//! Cycles are legal as long as each one runs through a delay-capable node.
//! Dropping every edge that leaves a delay-capable node breaks exactly those
//! cycles, so what remains cyclic after that is an undelayed cycle. For the
//! render order only the edges that leave a delay-capable node inside its
//! own cycle are dropped: those read the previous block, every other input
//! is rendered before the node that reads it.

/// Index-based adjacency view of the graph
pub(crate) struct Topology {
    /// Outgoing edges per node
    pub edges: Vec<Vec<usize>>,
    /// Whether each node holds a delay element
    pub delay_capable: Vec<bool>,
}

impl Topology {
    pub fn new(len: usize) -> Self {
        Self {
            edges: vec![Vec::new(); len],
            delay_capable: vec![false; len],
        }
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// The graph without the edges that leave delay-capable nodes
    fn pruned(&self) -> Vec<Vec<usize>> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, out)| if self.delay_capable[i] { Vec::new() } else { out.clone() })
            .collect()
    }

    /// The graph without its feedback edges
    ///
    /// A feedback edge leaves a delay-capable node and stays inside that
    /// node's strongly connected component.
    fn without_feedback(&self) -> Vec<Vec<usize>> {
        let mut component = vec![0usize; self.edges.len()];
        for (c, scc) in strongly_connected(&self.edges).iter().enumerate() {
            for &v in scc {
                component[v] = c;
            }
        }
        self.edges
            .iter()
            .enumerate()
            .map(|(i, out)| {
                out.iter()
                    .copied()
                    .filter(|&to| !(self.delay_capable[i] && component[i] == component[to]))
                    .collect()
            })
            .collect()
    }

    /// Whether `from -> to` reads the previous block
    pub fn is_feedback(&self, from: usize, to: usize) -> bool {
        self.delay_capable[from]
            && strongly_connected(&self.edges)
                .iter()
                .any(|scc| scc.contains(&from) && scc.contains(&to))
    }

    /// Node sets of every cycle that has no delay element
    ///
    /// Each entry is one strongly connected component of the pruned graph,
    /// sorted by index.
    pub fn undelayed_cycles(&self) -> Vec<Vec<usize>> {
        let pruned = self.pruned();
        strongly_connected(&pruned)
            .into_iter()
            .filter(|scc| scc.len() > 1 || pruned[scc[0]].contains(&scc[0]))
            .map(|mut scc| {
                scc.sort_unstable();
                scc
            })
            .collect()
    }

    /// Topological order without feedback edges (Kahn, lowest index first)
    ///
    /// Nodes stuck on an undelayed cycle are appended in index order so the
    /// result always covers every node.
    pub fn render_order(&self) -> Vec<usize> {
        let pruned = self.without_feedback();
        let n = pruned.len();
        let mut in_degree = vec![0usize; n];
        for out in &pruned {
            for &to in out {
                in_degree[to] += 1;
            }
        }

        let mut ready: std::collections::BTreeSet<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &to in &pruned[node] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() < n {
            let mut placed = vec![false; n];
            for &i in &order {
                placed[i] = true;
            }
            order.extend((0..n).filter(|&i| !placed[i]));
        }
        order
    }
}

/// Tarjan's strongly connected components
pub(crate) fn strongly_connected(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        edges: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        components: Vec<Vec<usize>>,
    }

    fn visit(state: &mut State<'_>, v: usize) {
        state.index[v] = Some(state.next);
        state.low[v] = state.next;
        state.next += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        for &w in &state.edges[v] {
            match state.index[w] {
                None => {
                    visit(state, w);
                    state.low[v] = state.low[v].min(state.low[w]);
                }
                Some(w_index) if state.on_stack[w] => {
                    state.low[v] = state.low[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(state.low[v]) == state.index[v] {
            let mut component = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let n = edges.len();
    let mut state = State {
        edges,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            visit(&mut state, v);
        }
    }
    state.components
}
