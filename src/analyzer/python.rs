//! Python backend for the structural analyzer, built on `rustpython-parser`.
//!
//! A hand-walked recursion over `ast::Stmt` / `ast::Expr` reduces the tree
//! to [`SourceFacts`]; all classification happens in the parent module.
//! Parse failures are data (`is_valid = false`), not errors.

use std::collections::BTreeSet;

use rustpython_parser::{ast, Parse};

use super::{assemble, CodeAnalysisResult, CodeIssue, FunctionProfile, SourceFacts};

const BUILTINS: &[&str] = &[
    "print", "len", "range", "int", "str", "float", "bool", "list", "dict", "set", "tuple",
    "sum", "min", "max", "abs", "sorted", "reversed", "enumerate", "zip", "map", "filter",
    "input", "open", "type", "isinstance", "round", "pow", "divmod", "ord", "chr", "any",
    "all", "object", "super", "id", "hash", "iter", "next", "repr", "Exception", "ValueError",
    "TypeError", "IndexError", "KeyError", "ZeroDivisionError", "StopIteration", "self",
    "__name__",
];

/// Nesting depth (loops + conditionals) at which code is flagged as deeply
/// nested.
const DEEP_NESTING_THRESHOLD: u32 = 4;

pub fn analyze(code: &str) -> CodeAnalysisResult {
    let suite = match ast::Suite::parse(code, "<student>") {
        Ok(suite) => suite,
        Err(e) => return CodeAnalysisResult::invalid(vec![e.to_string()]),
    };

    let mut collector = Collector::default();
    collector.walk_body(&suite);
    assemble(collector.finish())
}

#[derive(Debug, Default)]
struct FnScope {
    name: String,
    params: Vec<String>,
    stores: BTreeSet<String>,
    loads: BTreeSet<String>,
    calls: Vec<String>,
    self_calls: u32,
    has_return: bool,
    has_base_case: bool,
    branches: u32,
    loops: u32,
    bool_ops: u32,
}

#[derive(Debug, Default)]
struct Collector {
    facts: SourceFacts,
    fn_stack: Vec<FnScope>,
    function_names: BTreeSet<String>,
    module_stores: BTreeSet<String>,
    module_loads: BTreeSet<String>,
    loop_depth: u32,
    block_depth: u32,
    max_block_depth: u32,
}

impl Collector {
    fn finish(mut self) -> SourceFacts {
        if self.max_block_depth >= DEEP_NESTING_THRESHOLD {
            self.facts.issues.insert(CodeIssue::DeepNesting);
        }

        // Module-level unused assignments (not functions, not re-read).
        for name in &self.module_stores {
            if name.starts_with('_') || self.function_names.contains(name) {
                continue;
            }
            if !self.module_loads.contains(name) {
                self.facts.issues.insert(CodeIssue::UnusedVariable);
                break;
            }
        }

        self.facts
    }

    // ── statements ─────────────────────────────────────────

    fn walk_body(&mut self, body: &[ast::Stmt]) {
        let mut terminated = false;
        for stmt in body {
            if terminated {
                self.facts.issues.insert(CodeIssue::UnreachableCode);
            }
            self.walk_stmt(stmt);
            if matches!(
                stmt,
                ast::Stmt::Return(_) | ast::Stmt::Raise(_) | ast::Stmt::Break(_) | ast::Stmt::Continue(_)
            ) {
                terminated = true;
            }
        }
    }

    fn walk_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(def) => {
                self.walk_function(def.name.as_str(), &def.args, &def.body)
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                self.walk_function(def.name.as_str(), &def.args, &def.body)
            }
            ast::Stmt::ClassDef(def) => self.walk_body(&def.body),
            ast::Stmt::Return(ret) => {
                if let Some(scope) = self.fn_stack.last_mut() {
                    scope.has_return = true;
                }
                if let Some(value) = &ret.value {
                    self.walk_expr(value);
                }
            }
            ast::Stmt::Assign(assign) => {
                self.note_data_structure(&assign.value);
                for target in &assign.targets {
                    self.record_store_target(target);
                }
                self.walk_expr(&assign.value);
            }
            ast::Stmt::AugAssign(assign) => {
                // x += 1 both reads and writes x
                if let ast::Expr::Name(name) = assign.target.as_ref() {
                    self.record_load(name.id.as_str());
                }
                self.record_store_target(&assign.target);
                self.walk_expr(&assign.value);
            }
            ast::Stmt::AnnAssign(assign) => {
                self.record_store_target(&assign.target);
                if let Some(value) = &assign.value {
                    self.note_data_structure(value);
                    self.walk_expr(value);
                }
            }
            ast::Stmt::For(f) => self.walk_for(&f.target, &f.iter, &f.body, &f.orelse),
            ast::Stmt::AsyncFor(f) => self.walk_for(&f.target, &f.iter, &f.body, &f.orelse),
            ast::Stmt::While(w) => self.walk_while(&w.test, &w.body, &w.orelse),
            ast::Stmt::If(i) => {
                self.facts.conditionals += 1;
                if let Some(scope) = self.fn_stack.last_mut() {
                    scope.branches += 1;
                    if matches!(i.body.first(), Some(ast::Stmt::Return(_))) {
                        scope.has_base_case = true;
                    }
                }
                self.walk_expr(&i.test);
                self.enter_block();
                self.walk_body(&i.body);
                self.exit_block();
                self.walk_body(&i.orelse);
            }
            ast::Stmt::Try(t) => {
                for handler in &t.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    let broad = match &h.type_ {
                        None => true,
                        Some(expr) => matches!(
                            expr.as_ref(),
                            ast::Expr::Name(n) if n.id.as_str() == "Exception" || n.id.as_str() == "BaseException"
                        ),
                    };
                    if broad {
                        self.facts.issues.insert(CodeIssue::BroadExcept);
                    }
                    self.walk_body(&h.body);
                }
                self.walk_body(&t.body);
                self.walk_body(&t.orelse);
                self.walk_body(&t.finalbody);
            }
            ast::Stmt::With(w) => self.walk_body(&w.body),
            ast::Stmt::AsyncWith(w) => self.walk_body(&w.body),
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    let name = alias
                        .asname
                        .as_ref()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| {
                            alias.name.as_str().split('.').next().unwrap_or_default().to_string()
                        });
                    self.facts.imported.insert(name);
                }
            }
            ast::Stmt::ImportFrom(import) => {
                for alias in &import.names {
                    let name = alias
                        .asname
                        .as_ref()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| alias.name.to_string());
                    self.facts.imported.insert(name);
                }
            }
            ast::Stmt::Expr(e) => self.walk_expr(&e.value),
            ast::Stmt::Raise(r) => {
                if let Some(exc) = &r.exc {
                    self.walk_expr(exc);
                }
            }
            ast::Stmt::Assert(a) => self.walk_expr(&a.test),
            _ => {}
        }
    }

    fn walk_function(&mut self, name: &str, args: &ast::Arguments, body: &[ast::Stmt]) {
        self.function_names.insert(name.to_string());

        let mut params: Vec<String> = Vec::new();
        for arg in args.posonlyargs.iter().chain(args.args.iter()) {
            params.push(arg.def.arg.to_string());
        }
        for arg in &args.kwonlyargs {
            params.push(arg.def.arg.to_string());
        }
        if let Some(vararg) = &args.vararg {
            params.push(vararg.arg.to_string());
        }
        if let Some(kwarg) = &args.kwarg {
            params.push(kwarg.arg.to_string());
        }

        for param in &params {
            // param names feed pattern/concept heuristics like any other
            // identifier
            self.facts.variables.insert(param.clone());
            if BUILTINS.contains(&param.as_str()) && param != "self" {
                self.facts.issues.insert(CodeIssue::ShadowedName);
            }
        }

        self.fn_stack.push(FnScope {
            name: name.to_string(),
            params,
            ..FnScope::default()
        });
        self.walk_body(body);
        let scope = self.fn_stack.pop().expect("function scope");

        self.finalize_function(scope);
    }

    fn finalize_function(&mut self, scope: FnScope) {
        let is_recursive = scope.self_calls > 0;
        self.facts.max_self_calls = self.facts.max_self_calls.max(scope.self_calls);

        if is_recursive && !scope.has_base_case {
            self.facts.issues.insert(CodeIssue::MissingBaseCase);
        }
        if !scope.has_return && !is_recursive {
            self.facts.issues.insert(CodeIssue::MissingReturn);
        }

        // Unused locals: stored, never read, not intentionally ignored.
        for name in &scope.stores {
            if name.starts_with('_') {
                continue;
            }
            if !scope.loads.contains(name) {
                self.facts.issues.insert(CodeIssue::UnusedVariable);
                break;
            }
        }

        // Names read without any visible definition site.
        let enclosing: BTreeSet<&str> = self
            .fn_stack
            .iter()
            .flat_map(|s| s.stores.iter().map(|x| x.as_str()).chain(s.params.iter().map(|x| x.as_str())))
            .collect();
        for name in &scope.loads {
            let known = scope.stores.contains(name)
                || scope.params.iter().any(|p| p == name)
                || self.module_stores.contains(name)
                || self.function_names.contains(name)
                || self.facts.imported.contains(name)
                || enclosing.contains(name.as_str())
                || BUILTINS.contains(&name.as_str());
            if !known {
                self.facts.issues.insert(CodeIssue::UndefinedName);
                break;
            }
        }

        let profile = FunctionProfile {
            name: scope.name,
            params: scope.params,
            has_return: scope.has_return,
            is_recursive,
            has_base_case: scope.has_base_case,
            calls: scope.calls,
            cyclomatic_complexity: 1 + scope.branches + scope.loops + scope.bool_ops,
        };
        self.facts.functions.push(profile);
    }

    fn walk_for(
        &mut self,
        target: &ast::Expr,
        iter: &ast::Expr,
        body: &[ast::Stmt],
        orelse: &[ast::Stmt],
    ) {
        self.count_loop();
        self.record_store_target(target);
        self.walk_expr(iter);

        // for x in items: items.append(...) mutates the sequence being
        // iterated
        if let ast::Expr::Name(iterated) = iter {
            if body_mutates(body, iterated.id.as_str()) {
                self.facts.issues.insert(CodeIssue::MutationInIterator);
            }
        }

        self.enter_loop();
        self.walk_body(body);
        self.exit_loop();
        self.walk_body(orelse);
    }

    fn walk_while(&mut self, test: &ast::Expr, body: &[ast::Stmt], orelse: &[ast::Stmt]) {
        self.count_loop();

        let has_exit = contains_break(body) || contains_return(body);
        if !has_exit {
            if is_const_true(test) {
                self.facts.issues.insert(CodeIssue::InfiniteLoopSuspect);
            } else {
                let cond_names = names_loaded(test);
                let body_stores = stores_in(body);
                if cond_names.is_disjoint(&body_stores) {
                    self.facts.issues.insert(CodeIssue::InfiniteLoopSuspect);
                }
            }
        }

        self.walk_expr(test);
        self.enter_loop();
        self.walk_body(body);
        self.exit_loop();
        self.walk_body(orelse);
    }

    fn count_loop(&mut self) {
        self.facts.loops += 1;
        if let Some(scope) = self.fn_stack.last_mut() {
            scope.loops += 1;
        }
    }

    fn enter_loop(&mut self) {
        self.loop_depth += 1;
        self.facts.nesting_depth = self.facts.nesting_depth.max(self.loop_depth);
        self.enter_block();
    }

    fn exit_loop(&mut self) {
        self.loop_depth -= 1;
        self.exit_block();
    }

    fn enter_block(&mut self) {
        self.block_depth += 1;
        self.max_block_depth = self.max_block_depth.max(self.block_depth);
    }

    fn exit_block(&mut self) {
        self.block_depth -= 1;
    }

    // ── expressions ────────────────────────────────────────

    fn walk_expr(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::BoolOp(op) => {
                let connectives = op.values.len().saturating_sub(1) as u32;
                self.facts.bool_connectives += connectives;
                if let Some(scope) = self.fn_stack.last_mut() {
                    scope.bool_ops += connectives;
                }
                for value in &op.values {
                    self.walk_expr(value);
                }
            }
            ast::Expr::Compare(cmp) => {
                let inclusive = cmp
                    .ops
                    .iter()
                    .any(|op| matches!(op, ast::CmpOp::LtE | ast::CmpOp::GtE));
                let against_len = is_len_call(&cmp.left)
                    || cmp.comparators.iter().any(is_len_call);
                if inclusive && against_len {
                    self.facts.issues.insert(CodeIssue::OffByOneSuspect);
                }
                for comparator in &cmp.comparators {
                    if let ast::Expr::Constant(c) = comparator {
                        if let ast::Constant::Int(v) = &c.value {
                            let repr = v.to_string();
                            if !matches!(repr.as_str(), "0" | "1" | "2") {
                                self.facts.issues.insert(CodeIssue::MagicNumber);
                            }
                        }
                    }
                }
                self.walk_expr(&cmp.left);
                for comparator in &cmp.comparators {
                    self.walk_expr(comparator);
                }
            }
            ast::Expr::Call(call) => {
                match call.func.as_ref() {
                    ast::Expr::Name(name) => {
                        let called = name.id.to_string();
                        match called.as_str() {
                            "list" => self.facts.uses_list = true,
                            "dict" => self.facts.uses_dict = true,
                            "set" => self.facts.uses_set = true,
                            "sorted" => self.facts.calls_sort = true,
                            _ => {}
                        }
                        self.record_load(&called);
                        if let Some(scope) = self.fn_stack.last_mut() {
                            if called == scope.name {
                                scope.self_calls += 1;
                            }
                            scope.calls.push(called);
                        }
                    }
                    ast::Expr::Attribute(attr) => {
                        if attr.attr.as_str() == "sort" {
                            self.facts.calls_sort = true;
                        }
                        self.walk_expr(&attr.value);
                    }
                    other => self.walk_expr(other),
                }
                for arg in &call.args {
                    self.walk_expr(arg);
                }
                for keyword in &call.keywords {
                    self.walk_expr(&keyword.value);
                }
            }
            ast::Expr::Name(name) => match name.ctx {
                ast::ExprContext::Store => self.record_store(name.id.as_str()),
                _ => self.record_load(name.id.as_str()),
            },
            ast::Expr::List(list) => {
                self.facts.uses_list = true;
                for elt in &list.elts {
                    self.walk_expr(elt);
                }
            }
            ast::Expr::Dict(dict) => {
                self.facts.uses_dict = true;
                for key in dict.keys.iter().flatten() {
                    self.walk_expr(key);
                }
                for value in &dict.values {
                    self.walk_expr(value);
                }
            }
            ast::Expr::Set(set) => {
                self.facts.uses_set = true;
                for elt in &set.elts {
                    self.walk_expr(elt);
                }
            }
            ast::Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.walk_expr(elt);
                }
            }
            ast::Expr::BinOp(op) => {
                self.walk_expr(&op.left);
                self.walk_expr(&op.right);
            }
            ast::Expr::UnaryOp(op) => self.walk_expr(&op.operand),
            ast::Expr::IfExp(ifexp) => {
                self.facts.conditionals += 1;
                self.walk_expr(&ifexp.test);
                self.walk_expr(&ifexp.body);
                self.walk_expr(&ifexp.orelse);
            }
            ast::Expr::Subscript(sub) => {
                self.walk_expr(&sub.value);
                self.walk_expr(&sub.slice);
            }
            ast::Expr::Slice(slice) => {
                if let Some(lower) = &slice.lower {
                    self.walk_expr(lower);
                }
                if let Some(upper) = &slice.upper {
                    self.walk_expr(upper);
                }
                if let Some(step) = &slice.step {
                    self.walk_expr(step);
                }
            }
            ast::Expr::Attribute(attr) => self.walk_expr(&attr.value),
            ast::Expr::Starred(starred) => self.walk_expr(&starred.value),
            ast::Expr::NamedExpr(named) => {
                self.record_store_target(&named.target);
                self.walk_expr(&named.value);
            }
            ast::Expr::ListComp(comp) => {
                self.facts.uses_list = true;
                self.walk_comprehension(&comp.generators);
                self.walk_expr(&comp.elt);
            }
            ast::Expr::SetComp(comp) => {
                self.facts.uses_set = true;
                self.walk_comprehension(&comp.generators);
                self.walk_expr(&comp.elt);
            }
            ast::Expr::DictComp(comp) => {
                self.facts.uses_dict = true;
                self.walk_comprehension(&comp.generators);
                self.walk_expr(&comp.key);
                self.walk_expr(&comp.value);
            }
            ast::Expr::GeneratorExp(comp) => {
                self.walk_comprehension(&comp.generators);
                self.walk_expr(&comp.elt);
            }
            ast::Expr::Lambda(lambda) => self.walk_expr(&lambda.body),
            ast::Expr::Await(a) => self.walk_expr(&a.value),
            _ => {}
        }
    }

    fn walk_comprehension(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.record_store_target(&generator.target);
            self.walk_expr(&generator.iter);
            for cond in &generator.ifs {
                self.walk_expr(cond);
            }
        }
    }

    // ── name bookkeeping ───────────────────────────────────

    fn record_store_target(&mut self, target: &ast::Expr) {
        match target {
            ast::Expr::Name(name) => self.record_store(name.id.as_str()),
            ast::Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.record_store_target(elt);
                }
            }
            ast::Expr::List(list) => {
                for elt in &list.elts {
                    self.record_store_target(elt);
                }
            }
            // subscript/attribute stores mutate an existing binding
            ast::Expr::Subscript(sub) => {
                self.walk_expr(&sub.value);
                self.walk_expr(&sub.slice);
            }
            ast::Expr::Attribute(attr) => self.walk_expr(&attr.value),
            _ => {}
        }
    }

    fn record_store(&mut self, name: &str) {
        self.facts.variables.insert(name.to_string());
        if BUILTINS.contains(&name) || self.function_names.contains(name) {
            self.facts.issues.insert(CodeIssue::ShadowedName);
        }
        match self.fn_stack.last_mut() {
            Some(scope) => {
                scope.stores.insert(name.to_string());
            }
            None => {
                self.module_stores.insert(name.to_string());
            }
        }
    }

    fn record_load(&mut self, name: &str) {
        match self.fn_stack.last_mut() {
            Some(scope) => {
                scope.loads.insert(name.to_string());
            }
            None => {
                self.module_loads.insert(name.to_string());
            }
        }
    }

    fn note_data_structure(&mut self, value: &ast::Expr) {
        match value {
            ast::Expr::List(_) => self.facts.uses_list = true,
            ast::Expr::Dict(_) => self.facts.uses_dict = true,
            ast::Expr::Set(_) => self.facts.uses_set = true,
            _ => {}
        }
    }
}

// ── free helpers ───────────────────────────────────────────

fn is_const_true(expr: &ast::Expr) -> bool {
    matches!(
        expr,
        ast::Expr::Constant(c) if matches!(c.value, ast::Constant::Bool(true))
    )
}

fn is_len_call(expr: &ast::Expr) -> bool {
    matches!(
        expr,
        ast::Expr::Call(call) if matches!(
            call.func.as_ref(),
            ast::Expr::Name(n) if n.id.as_str() == "len"
        )
    )
}

/// Break belonging to THIS loop: nested loops swallow their own breaks.
fn contains_break(body: &[ast::Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        ast::Stmt::Break(_) => true,
        ast::Stmt::If(i) => contains_break(&i.body) || contains_break(&i.orelse),
        ast::Stmt::Try(t) => {
            contains_break(&t.body) || contains_break(&t.orelse) || contains_break(&t.finalbody)
        }
        ast::Stmt::With(w) => contains_break(&w.body),
        _ => false,
    })
}

fn contains_return(body: &[ast::Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        ast::Stmt::Return(_) => true,
        ast::Stmt::If(i) => contains_return(&i.body) || contains_return(&i.orelse),
        ast::Stmt::For(f) => contains_return(&f.body) || contains_return(&f.orelse),
        ast::Stmt::While(w) => contains_return(&w.body) || contains_return(&w.orelse),
        ast::Stmt::Try(t) => {
            contains_return(&t.body) || contains_return(&t.orelse) || contains_return(&t.finalbody)
        }
        ast::Stmt::With(w) => contains_return(&w.body),
        _ => false,
    })
}

fn names_loaded(expr: &ast::Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_loads(expr, &mut names);
    names
}

fn collect_loads(expr: &ast::Expr, out: &mut BTreeSet<String>) {
    match expr {
        ast::Expr::Name(name) => {
            out.insert(name.id.to_string());
        }
        ast::Expr::BoolOp(op) => {
            for v in &op.values {
                collect_loads(v, out);
            }
        }
        ast::Expr::BinOp(op) => {
            collect_loads(&op.left, out);
            collect_loads(&op.right, out);
        }
        ast::Expr::UnaryOp(op) => collect_loads(&op.operand, out),
        ast::Expr::Compare(cmp) => {
            collect_loads(&cmp.left, out);
            for c in &cmp.comparators {
                collect_loads(c, out);
            }
        }
        ast::Expr::Call(call) => {
            collect_loads(&call.func, out);
            for a in &call.args {
                collect_loads(a, out);
            }
        }
        ast::Expr::Subscript(sub) => {
            collect_loads(&sub.value, out);
            collect_loads(&sub.slice, out);
        }
        ast::Expr::Attribute(attr) => collect_loads(&attr.value, out),
        _ => {}
    }
}

/// All names assigned anywhere inside a body (nested blocks included,
/// nested functions excluded).
fn stores_in(body: &[ast::Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_stores(body, &mut out);
    out
}

fn collect_stores(body: &[ast::Stmt], out: &mut BTreeSet<String>) {
    for stmt in body {
        match stmt {
            ast::Stmt::Assign(a) => {
                for t in &a.targets {
                    store_names(t, out);
                }
            }
            ast::Stmt::AugAssign(a) => store_names(&a.target, out),
            ast::Stmt::AnnAssign(a) => store_names(&a.target, out),
            ast::Stmt::For(f) => {
                store_names(&f.target, out);
                collect_stores(&f.body, out);
                collect_stores(&f.orelse, out);
            }
            ast::Stmt::While(w) => {
                collect_stores(&w.body, out);
                collect_stores(&w.orelse, out);
            }
            ast::Stmt::If(i) => {
                collect_stores(&i.body, out);
                collect_stores(&i.orelse, out);
            }
            ast::Stmt::Try(t) => {
                collect_stores(&t.body, out);
                collect_stores(&t.orelse, out);
                collect_stores(&t.finalbody, out);
            }
            ast::Stmt::With(w) => collect_stores(&w.body, out),
            _ => {}
        }
    }
}

fn store_names(target: &ast::Expr, out: &mut BTreeSet<String>) {
    match target {
        ast::Expr::Name(name) => {
            out.insert(name.id.to_string());
        }
        ast::Expr::Tuple(tuple) => {
            for elt in &tuple.elts {
                store_names(elt, out);
            }
        }
        // mutation through a subscript still advances loop conditions
        // like `arr[i] = ...`, so count the base name
        ast::Expr::Subscript(sub) => store_names(&sub.value, out),
        _ => {}
    }
}

/// Does the loop body call a mutating method on `name`?
fn body_mutates(body: &[ast::Stmt], name: &str) -> bool {
    const MUTATORS: &[&str] = &["append", "remove", "pop", "insert", "extend", "clear"];
    body.iter().any(|stmt| match stmt {
        ast::Stmt::Expr(e) => expr_mutates(&e.value, name, MUTATORS),
        ast::Stmt::If(i) => body_mutates(&i.body, name) || body_mutates(&i.orelse, name),
        ast::Stmt::For(f) => body_mutates(&f.body, name),
        ast::Stmt::While(w) => body_mutates(&w.body, name),
        _ => false,
    })
}

fn expr_mutates(expr: &ast::Expr, name: &str, mutators: &[&str]) -> bool {
    if let ast::Expr::Call(call) = expr {
        if let ast::Expr::Attribute(attr) = call.func.as_ref() {
            if mutators.contains(&attr.attr.as_str()) {
                if let ast::Expr::Name(base) = attr.value.as_ref() {
                    return base.id.as_str() == name;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AlgorithmPattern;

    #[test]
    fn recursive_without_base_case_is_flagged() {
        let result = analyze("def factorial(n):\n    return n * factorial(n-1)\n");
        assert!(result.is_valid);
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::Recursive);
        assert!(result.issues.contains(&CodeIssue::MissingBaseCase));
        assert!(result.extracted_concepts.contains(&"recursion".to_string()));
        let profile = &result.function_profiles[0];
        assert!(profile.is_recursive);
        assert!(!profile.has_base_case);
    }

    #[test]
    fn correct_factorial_is_clean() {
        let result =
            analyze("def factorial(n):\n    if n == 0:\n        return 1\n    return n * factorial(n-1)\n");
        assert!(result.is_valid);
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::Recursive);
        assert!(result.issues.is_empty(), "issues: {:?}", result.issues);
        assert!(result.function_profiles[0].has_base_case);
    }

    #[test]
    fn syntax_error_yields_invalid_with_defaults() {
        let result = analyze("def broken(:\n    pass\n");
        assert!(!result.is_valid);
        assert!(!result.syntax_errors.is_empty());
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::Unknown);
        assert!(result.function_profiles.is_empty());
    }

    #[test]
    fn analysis_is_deterministic() {
        let code = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        let a = serde_json::to_string(&analyze(code)).unwrap();
        let b = serde_json::to_string(&analyze(code)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn while_true_without_break_is_infinite_loop_suspect() {
        let result = analyze("def spin():\n    while True:\n        x = 1\n");
        assert!(result.issues.contains(&CodeIssue::InfiniteLoopSuspect));
    }

    #[test]
    fn while_with_untouched_condition_is_suspect() {
        let result = analyze("def wait(n):\n    i = 0\n    while i < n:\n        print(i)\n");
        assert!(result.issues.contains(&CodeIssue::InfiniteLoopSuspect));
    }

    #[test]
    fn while_advancing_its_condition_is_fine() {
        let result = analyze(
            "def count(n):\n    i = 0\n    while i < n:\n        i += 1\n    return i\n",
        );
        assert!(!result.issues.contains(&CodeIssue::InfiniteLoopSuspect));
    }

    #[test]
    fn two_pointer_walk_is_classified() {
        let code = "def pair_sum(arr, target):\n    left = 0\n    right = len(arr) - 1\n    while left < right:\n        s = arr[left] + arr[right]\n        if s == target:\n            return (left, right)\n        if s < target:\n            left += 1\n        else:\n            right -= 1\n    return None\n";
        let result = analyze(code);
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::TwoPointer);
        assert!(result.extracted_concepts.contains(&"two_pointer".to_string()));
    }

    #[test]
    fn nested_loops_are_brute_force() {
        let code = "def pairs(xs):\n    out = []\n    for i in xs:\n        for j in xs:\n            out.append((i, j))\n    return out\n";
        let result = analyze(code);
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::BruteForce);
        assert_eq!(result.metrics.nesting_depth, 2);
    }

    #[test]
    fn unused_variable_and_shadowed_builtin_are_flagged() {
        let code = "def f(xs):\n    sum = 0\n    unused = 3\n    for x in xs:\n        sum += x\n    return sum\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::UnusedVariable));
        assert!(result.issues.contains(&CodeIssue::ShadowedName));
    }

    #[test]
    fn bare_except_is_flagged() {
        let code = "def f(x):\n    try:\n        return 1 / x\n    except:\n        return 0\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::BroadExcept));
    }

    #[test]
    fn undefined_name_is_flagged() {
        let code = "def f(x):\n    return x + missing_thing\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::UndefinedName));
    }

    #[test]
    fn unreachable_code_after_return() {
        let code = "def f(x):\n    return x\n    print(x)\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::UnreachableCode));
    }

    #[test]
    fn mutation_while_iterating_is_flagged() {
        let code = "def dedupe(items):\n    for item in items:\n        if item == 0:\n            items.remove(item)\n    return items\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::MutationInIterator));
    }

    #[test]
    fn inclusive_len_comparison_is_off_by_one_suspect() {
        let code = "def last(xs):\n    i = 0\n    while i <= len(xs):\n        i += 1\n    return i\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::OffByOneSuspect));
    }

    #[test]
    fn magic_number_in_comparison_is_flagged() {
        let code = "def check(x):\n    if x == 37:\n        return True\n    return False\n";
        let result = analyze(code);
        assert!(result.issues.contains(&CodeIssue::MagicNumber));
    }

    #[test]
    fn complexity_counts_branches_loops_and_connectives() {
        let code = "def f(a, b):\n    if a and b:\n        return 1\n    for i in range(3):\n        print(i)\n    return 0\n";
        let result = analyze(code);
        // 1 + 1 conditional + 1 loop + 1 connective
        assert_eq!(result.metrics.complexity, 4);
    }

    #[test]
    fn memoized_recursion_is_dynamic_programming() {
        let code = "def fib(n, memo={}):\n    if n in memo:\n        return memo[n]\n    if n < 2:\n        return n\n    memo[n] = fib(n-1, memo) + fib(n-2, memo)\n    return memo[n]\n";
        let result = analyze(code);
        assert_eq!(result.algorithm_pattern, AlgorithmPattern::DynamicProgramming);
    }
}
