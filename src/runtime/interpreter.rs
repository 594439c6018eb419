use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{AssignOp, BinaryOp, Expr, Program, Stmt, UnaryOp};
use crate::error::{Error, Result};
use crate::location::Location;
use crate::runtime::env::Env;
use crate::runtime::output::{OutputBuffer, value_to_string};
use crate::runtime::value::{FunctionValue, Value};

/// Abort runaway `while` loops in hosts that cannot interrupt evaluation.
const WHILE_ITERATION_LIMIT: usize = 1_000_000;

/// Control-flow marker for statement execution. `Return` carries the value
/// out of the enclosing function body and is caught by the call that
/// created the frame.
pub(crate) enum Flow {
    Normal,
    Return(Value),
}

/// Tree-walking evaluator. Statements execute against the active
/// environment frame; calls and `for` bodies swap in child frames and
/// restore the previous one when they finish.
pub struct Interpreter {
    env: Rc<RefCell<Env>>,
    output: OutputBuffer,
    path: String,
    call_depth: usize,
}

impl Interpreter {
    pub fn new(env: Rc<RefCell<Env>>, path: impl Into<String>) -> Self {
        Self {
            env,
            output: OutputBuffer::new(),
            path: path.into(),
            call_depth: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn output(&self) -> &str {
        self.output.as_str()
    }

    pub fn write_text(&mut self, text: &str) {
        self.output.write_text(text);
    }

    pub fn exec_program(&mut self, program: &Program) -> Result<()> {
        for stmt in &program.statements {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match self.exec_statement(stmt)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(self.runtime_error("return outside of function")),
        }
    }

    fn exec_statement(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::VarDecl { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                self.env.borrow_mut().set_local(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Echo { expr } => {
                let value = self.eval_expr(expr)?;
                self.output.write_value(&value);
                Ok(Flow::Normal)
            }
            Stmt::Expr { expr } => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                branches,
                else_body,
            } => {
                for branch in branches {
                    if self.eval_expr(&branch.condition)?.is_truthy() {
                        return self.exec_block(&branch.body);
                    }
                }
                if let Some(body) = else_body {
                    return self.exec_block(body);
                }
                Ok(Flow::Normal)
            }
            Stmt::While { condition, body } => {
                let mut iterations = 0usize;
                while self.eval_expr(condition)?.is_truthy() {
                    iterations += 1;
                    if iterations > WHILE_ITERATION_LIMIT {
                        return Err(self.runtime_error("loop limit exceeded"));
                    }
                    if let Flow::Return(value) = self.exec_block(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                index_name,
                value_name,
                iterable,
                body,
            } => self.exec_for(index_name.as_deref(), value_name, iterable, body),
            Stmt::FunctionDecl { name, params, body } => {
                let function = FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::clone(body),
                    closure: Rc::clone(&self.env),
                };
                self.env
                    .borrow_mut()
                    .set_local(name.clone(), Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Stmt::Return { value } => {
                if self.call_depth == 0 {
                    return Err(self.runtime_error("return outside of function"));
                }
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow> {
        for stmt in body {
            if let Flow::Return(value) = self.exec_statement(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(
        &mut self,
        index_name: Option<&str>,
        value_name: &str,
        iterable: &Expr,
        body: &[Stmt],
    ) -> Result<Flow> {
        let iterable = self.eval_expr(iterable)?;
        match iterable {
            Value::Array(items) => {
                // Snapshot so body mutations cannot invalidate the borrow
                // mid-iteration.
                let snapshot: Vec<Value> = items.borrow().clone();
                for (position, element) in snapshot.into_iter().enumerate() {
                    let flow = self.run_loop_iteration(
                        index_name,
                        Value::Number(position as f64),
                        value_name,
                        element,
                        body,
                    )?;
                    if let Flow::Return(value) = flow {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Value::Object(map) => {
                // Keys iterate in lexicographic order.
                let entries: Vec<(String, Value)> = map
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                for (key, value) in entries {
                    let flow = self.run_loop_iteration(
                        index_name,
                        Value::String(key),
                        value_name,
                        value,
                        body,
                    )?;
                    if let Flow::Return(value) = flow {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            other => Err(self.runtime_error(&format!(
                "for loop expects an array or object, got {}",
                other.type_name()
            ))),
        }
    }

    fn run_loop_iteration(
        &mut self,
        index_name: Option<&str>,
        index_value: Value,
        value_name: &str,
        value: Value,
        body: &[Stmt],
    ) -> Result<Flow> {
        let loop_env = Env::with_parent(Rc::clone(&self.env));
        {
            let mut frame = loop_env.borrow_mut();
            if let Some(name) = index_name {
                frame.set_local(name, index_value);
            }
            frame.set_local(value_name, value);
        }
        let previous = std::mem::replace(&mut self.env, loop_env);
        let result = self.exec_block(body);
        self.env = previous;
        result
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal { repr } => self.eval_literal(repr),
            Expr::Identifier { name } => self.lookup(name),
            Expr::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Negate => {
                        let number = self.require_number(&operand, "unary '-'")?;
                        Ok(Value::Number(-number))
                    }
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::ArrayLiteral { elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element)?);
                }
                Ok(Value::array(values))
            }
            Expr::ObjectLiteral { fields } => {
                let mut map = BTreeMap::new();
                for (key, value_expr) in fields {
                    let key = decode_string_literal(key);
                    let value = self.eval_expr(value_expr)?;
                    map.insert(key, value);
                }
                Ok(Value::object(map))
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Index { object, index } => self.eval_index(object, index),
            Expr::Assignment { target, op, value } => self.eval_assignment(target, *op, value),
        }
    }

    fn eval_literal(&self, repr: &str) -> Result<Value> {
        if repr == "null" {
            return Ok(Value::Null);
        }
        if repr == "bool(true)" {
            return Ok(Value::Bool(true));
        }
        if repr == "bool(false)" {
            return Ok(Value::Bool(false));
        }
        if let Some(inner) = repr.strip_prefix("num(").and_then(|rest| rest.strip_suffix(')')) {
            let number = inner
                .parse::<f64>()
                .map_err(|_| self.runtime_error(&format!("unknown literal: {repr}")))?;
            return Ok(Value::Number(number));
        }
        if let Some(inner) = repr.strip_prefix("str(").and_then(|rest| rest.strip_suffix(')')) {
            return Ok(Value::String(decode_string_literal(inner)));
        }
        Err(self.runtime_error(&format!("unknown literal: {repr}")))
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
        // `and`/`or` short-circuit; everything else is strict left-then-right.
        match op {
            BinaryOp::And => {
                let left = self.eval_expr(left)?;
                if !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval_expr(right)?;
                Ok(Value::Bool(right.is_truthy()))
            }
            BinaryOp::Or => {
                let left = self.eval_expr(left)?;
                if left.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expr(right)?;
                Ok(Value::Bool(right.is_truthy()))
            }
            _ => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.apply_binary(op, left, right)
            }
        }
    }

    fn apply_binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        let symbol = op.symbol();
        match op {
            BinaryOp::Add => Ok(Value::Number(
                self.require_number(&left, symbol)? + self.require_number(&right, symbol)?,
            )),
            BinaryOp::Subtract => Ok(Value::Number(
                self.require_number(&left, symbol)? - self.require_number(&right, symbol)?,
            )),
            BinaryOp::Multiply => Ok(Value::Number(
                self.require_number(&left, symbol)? * self.require_number(&right, symbol)?,
            )),
            BinaryOp::Divide => {
                let divisor = self.require_number(&right, symbol)?;
                if divisor == 0.0 {
                    return Err(self.runtime_error("division by zero"));
                }
                Ok(Value::Number(self.require_number(&left, symbol)? / divisor))
            }
            BinaryOp::Modulo => {
                let lhs = self.require_number(&left, symbol)?;
                let rhs = self.require_number(&right, symbol)?;
                if rhs == 0.0 {
                    return Err(self.runtime_error("division by zero"));
                }
                // Remainder keeps the sign of the dividend.
                Ok(Value::Number(lhs % rhs))
            }
            BinaryOp::Concat => Ok(Value::String(
                value_to_string(&left) + &value_to_string(&right),
            )),
            BinaryOp::Equal => Ok(Value::Bool(left == right)),
            BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOp::Less => {
                let lhs = self.require_number(&left, symbol)?;
                let rhs = self.require_number(&right, symbol)?;
                Ok(Value::Bool(lhs < rhs))
            }
            BinaryOp::LessEqual => {
                let lhs = self.require_number(&left, symbol)?;
                let rhs = self.require_number(&right, symbol)?;
                Ok(Value::Bool(lhs <= rhs))
            }
            BinaryOp::Greater => {
                let lhs = self.require_number(&left, symbol)?;
                let rhs = self.require_number(&right, symbol)?;
                Ok(Value::Bool(lhs > rhs))
            }
            BinaryOp::GreaterEqual => {
                let lhs = self.require_number(&left, symbol)?;
                let rhs = self.require_number(&right, symbol)?;
                Ok(Value::Bool(lhs >= rhs))
            }
            BinaryOp::And | BinaryOp::Or => {
                Err(self.runtime_error(&format!("unsupported binary operator: {symbol}")))
            }
        }
    }

    fn eval_assignment(&mut self, target: &Expr, op: AssignOp, value_expr: &Expr) -> Result<Value> {
        match target {
            Expr::Identifier { name } => {
                let rhs = self.eval_expr(value_expr)?;
                if op == AssignOp::Assign {
                    self.env.borrow_mut().assign(name, rhs.clone());
                    return Ok(rhs);
                }
                let current = self.lookup(name)?;
                let updated = self.apply_compound(op, current, rhs)?;
                self.env.borrow_mut().assign(name, updated.clone());
                Ok(updated)
            }
            Expr::Index { object, index } => {
                let collection = self.eval_expr(object)?;
                let index_value = self.eval_expr(index)?;
                let rhs = self.eval_expr(value_expr)?;
                match collection {
                    Value::Array(items) => {
                        let index = self.require_array_index(&index_value)?;
                        if op == AssignOp::Assign {
                            let mut items = items.borrow_mut();
                            if index < items.len() {
                                items[index] = rhs.clone();
                            } else if index == items.len() {
                                items.push(rhs.clone());
                            } else {
                                return Err(self.runtime_error("array index out of range"));
                            }
                            return Ok(rhs);
                        }
                        let current = {
                            let items = items.borrow();
                            items
                                .get(index)
                                .cloned()
                                .ok_or_else(|| self.runtime_error("array index out of range"))?
                        };
                        let updated = self.apply_compound(op, current, rhs)?;
                        items.borrow_mut()[index] = updated.clone();
                        Ok(updated)
                    }
                    Value::Object(map) => {
                        let Value::String(key) = index_value else {
                            return Err(self.runtime_error("object keys must be strings"));
                        };
                        if op == AssignOp::Assign {
                            map.borrow_mut().insert(key, rhs.clone());
                            return Ok(rhs);
                        }
                        let current = map.borrow().get(&key).cloned().unwrap_or(Value::Null);
                        let updated = self.apply_compound(op, current, rhs)?;
                        map.borrow_mut().insert(key, updated.clone());
                        Ok(updated)
                    }
                    other => Err(self.runtime_error(&format!(
                        "index assignment requires an array or object, got {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(self.runtime_error("assignment target must be an identifier or index")),
        }
    }

    fn apply_compound(&self, op: AssignOp, current: Value, rhs: Value) -> Result<Value> {
        let symbol = op.symbol();
        match op {
            AssignOp::Assign => Ok(rhs),
            AssignOp::AddAssign => Ok(Value::Number(
                self.require_number(&current, symbol)? + self.require_number(&rhs, symbol)?,
            )),
            AssignOp::SubtractAssign => Ok(Value::Number(
                self.require_number(&current, symbol)? - self.require_number(&rhs, symbol)?,
            )),
            AssignOp::MultiplyAssign => Ok(Value::Number(
                self.require_number(&current, symbol)? * self.require_number(&rhs, symbol)?,
            )),
            AssignOp::DivideAssign => {
                let divisor = self.require_number(&rhs, symbol)?;
                if divisor == 0.0 {
                    return Err(self.runtime_error("division by zero"));
                }
                Ok(Value::Number(self.require_number(&current, symbol)? / divisor))
            }
            AssignOp::ModuloAssign => {
                let divisor = self.require_number(&rhs, symbol)?;
                if divisor == 0.0 {
                    return Err(self.runtime_error("division by zero"));
                }
                Ok(Value::Number(self.require_number(&current, symbol)? % divisor))
            }
            AssignOp::ConcatAssign => Ok(Value::String(
                value_to_string(&current) + &value_to_string(&rhs),
            )),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        let callee = self.eval_expr(callee)?;
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_expr(arg)?);
        }
        match callee {
            Value::Builtin(builtin) => (builtin.callback)(self, &evaluated, &Location::start()),
            Value::Function(function) => self.call_function(function, evaluated),
            _ => Err(self.runtime_error("attempt to call non-function value")),
        }
    }

    fn call_function(&mut self, function: Rc<FunctionValue>, args: Vec<Value>) -> Result<Value> {
        let call_env = Env::with_parent(Rc::clone(&function.closure));
        {
            let mut frame = call_env.borrow_mut();
            for (position, param) in function.params.iter().enumerate() {
                let value = args.get(position).cloned().unwrap_or(Value::Null);
                frame.set_local(param.clone(), value);
            }
            // A named function can always call itself from its own body.
            if !function.name.is_empty() {
                frame.set_local(function.name.clone(), Value::Function(Rc::clone(&function)));
            }
        }

        let previous = std::mem::replace(&mut self.env, call_env);
        self.call_depth += 1;
        let result = self.exec_block(&function.body);
        self.env = previous;
        self.call_depth -= 1;

        match result? {
            Flow::Normal => Ok(Value::Null),
            Flow::Return(value) => Ok(value),
        }
    }

    fn eval_index(&mut self, object: &Expr, index: &Expr) -> Result<Value> {
        let collection = self.eval_expr(object)?;
        let index_value = self.eval_expr(index)?;
        match collection {
            Value::Array(items) => {
                let index = self.require_array_index(&index_value)?;
                let items = items.borrow();
                items
                    .get(index)
                    .cloned()
                    .ok_or_else(|| self.runtime_error("array index out of range"))
            }
            Value::Object(map) => match index_value {
                Value::String(key) => Ok(map.borrow().get(&key).cloned().unwrap_or(Value::Null)),
                _ => Err(self.runtime_error("object keys must be strings")),
            },
            other => Err(self.runtime_error(&format!(
                "indexing requires an array or object, got {}",
                other.type_name()
            ))),
        }
    }

    fn require_array_index(&self, value: &Value) -> Result<usize> {
        let number = self.require_number(value, "array index")?;
        if number.floor() != number || number < 0.0 {
            return Err(self.runtime_error("array index must be a non-negative integer"));
        }
        Ok(number as usize)
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.env
            .borrow()
            .find(name)
            .ok_or_else(|| self.runtime_error(&format!("undefined variable: {name}")))
    }

    fn require_number(&self, value: &Value, context: &str) -> Result<f64> {
        match value {
            Value::Number(number) => Ok(*number),
            _ => Err(self.runtime_error(&format!("{context} expects numbers"))),
        }
    }

    pub(crate) fn runtime_error(&self, message: &str) -> Error {
        Error::runtime(message, &self.path, Location::start())
    }
}

/// Strip the surrounding quotes from a string-literal lexeme and decode its
/// escapes: `\n`, `\t`, `\\`, `\"`, `\'`; any other `\X` passes `X` through.
pub(crate) fn decode_string_literal(literal: &str) -> String {
    let bytes = literal.as_bytes();
    if bytes.len() < 2 {
        return String::new();
    }
    let end = bytes.len() - 1;
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 1;
    while i < end {
        let byte = bytes[i];
        if byte == b'\\' && i + 1 < end {
            let next = bytes[i + 1];
            decoded.push(match next {
                b'n' => b'\n',
                b't' => b'\t',
                other => other,
            });
            i += 2;
        } else {
            decoded.push(byte);
            i += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::tokenize;
    use crate::parser::{parse_expression, parse_program};
    use crate::runtime::builtins::install_builtins;
    use indoc::indoc;

    fn run(source: &str) -> Result<String> {
        let root = Rc::new(RefCell::new(Env::new()));
        install_builtins(&mut root.borrow_mut());
        let mut interpreter = Interpreter::new(root, "test.pol");
        let tokens = tokenize(source, "test.pol")?;
        let program = parse_program(tokens, "test.pol")?;
        interpreter.exec_program(&program)?;
        Ok(interpreter.output().to_string())
    }

    fn run_expr(source: &str) -> Result<Value> {
        let root = Rc::new(RefCell::new(Env::new()));
        install_builtins(&mut root.borrow_mut());
        let mut interpreter = Interpreter::new(root, "test.pol");
        let tokens = tokenize(source, "test.pol")?;
        let expr = parse_expression(tokens, "test.pol")?;
        interpreter.eval_expr(&expr)
    }

    fn expect_runtime_error(source: &str, fragment: &str) {
        let error = run(source).expect_err("expected runtime failure");
        assert_eq!(error.kind, ErrorKind::Runtime);
        assert!(
            error.to_string().contains(fragment),
            "expected '{fragment}' in '{error}'"
        );
    }

    #[test]
    fn echoes_compound_assignment_results() {
        let output = run("var x = 1; echo x; x += 2; echo x").expect("run");
        assert_eq!(output, "13");
    }

    #[test]
    fn evaluates_recursive_functions() {
        let source = indoc! {"
            function fact(n)
              if n <= 1 return 1 end
              return n * fact(n - 1)
            end
            echo fact(5)
        "};
        assert_eq!(run(source).expect("run"), "120");
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let source = indoc! {"
            function make_adder(x)
              function add(y) return x + y end
              return add
            end
            echo make_adder(1)(41)
        "};
        assert_eq!(run(source).expect("run"), "42");
    }

    #[test]
    fn closures_share_captured_state_across_calls() {
        let source = indoc! {"
            function make_counter()
              var count = 0
              function tick() count += 1 return count end
              return tick
            end
            var counter = make_counter()
            echo counter()
            echo counter()
        "};
        assert_eq!(run(source).expect("run"), "12");
    }

    #[test]
    fn for_over_object_iterates_keys_in_sorted_order() {
        let source = r#"var o = {"b":2,"a":1}; for k,v in o echo k echo v end"#;
        assert_eq!(run(source).expect("run"), "a1b2");
    }

    #[test]
    fn for_over_array_binds_position_and_element() {
        let source = "for i, v in [10, 20] echo i echo v end";
        assert_eq!(run(source).expect("run"), "010120");
    }

    #[test]
    fn for_over_range_echoes_each_value() {
        assert_eq!(run("for i in range(5) echo i end").expect("run"), "01234");
    }

    #[test]
    fn loop_variables_do_not_leak() {
        expect_runtime_error("for v in [1] end echo v", "undefined variable: v");
    }

    #[test]
    fn for_rejects_scalar_iterables() {
        expect_runtime_error("for v in 5 end", "for loop expects an array or object");
    }

    #[test]
    fn while_loops_until_condition_is_falsy() {
        let source = "var n = 0; while n < 3 echo n; n += 1 end";
        assert_eq!(run(source).expect("run"), "012");
    }

    #[test]
    fn while_aborts_at_the_iteration_limit() {
        expect_runtime_error("var n = 0; while true n += 1 end", "loop limit exceeded");
    }

    #[test]
    fn if_branches_share_the_enclosing_scope() {
        let source = "var x = 0; if true var x = 1 end echo x";
        assert_eq!(run(source).expect("run"), "1");
    }

    #[test]
    fn elseif_and_else_branches_select_in_order() {
        let source = indoc! {"
            function pick(n)
              if n == 1 return 'one'
              elseif n == 2 return 'two'
              else return 'many'
              end
            end
            echo pick(1) echo pick(2) echo pick(3)
        "};
        assert_eq!(run(source).expect("run"), "onetwomany");
    }

    #[test]
    fn aggregates_are_shared_through_aliases() {
        let source = "var a = [1]; var b = a; push(b, 2); echo count(a)";
        assert_eq!(run(source).expect("run"), "2");
    }

    #[test]
    fn scalars_copy_on_assignment() {
        let source = "var a = 1; var b = a; b += 1; echo a echo b";
        assert_eq!(run(source).expect("run"), "12");
    }

    #[test]
    fn array_index_assignment_sets_and_appends() {
        let source = "var a = [1]; a[0] = 2; a[1] = 3; echo a[0] echo a[1]";
        assert_eq!(run(source).expect("run"), "23");
        expect_runtime_error("var a = [1]; a[5] = 2", "array index out of range");
    }

    #[test]
    fn object_index_assignment_inserts_any_key() {
        let source = r#"var o = {}; o["x"] = 1; o["x"] += 2; echo o["x"]"#;
        assert_eq!(run(source).expect("run"), "3");
    }

    #[test]
    fn missing_object_keys_read_as_null() {
        let source = r#"var o = {"a":1}; echo is_null(o["missing"])"#;
        assert_eq!(run(source).expect("run"), "true");
    }

    #[test]
    fn array_index_must_be_a_non_negative_integer() {
        expect_runtime_error("var a = [1]; echo a[-1]", "non-negative integer");
        expect_runtime_error("var a = [1]; echo a[0.5]", "non-negative integer");
        expect_runtime_error("var a = [1]; echo a[1]", "array index out of range");
        expect_runtime_error("var a = [1]; echo a['0']", "array index expects numbers");
    }

    #[test]
    fn string_literals_decode_escapes_at_evaluation() {
        assert_eq!(run(r#"echo 'a\nb\t\\\'c\q'"#).expect("run"), "a\nb\t\\'cq");
    }

    #[test]
    fn decode_handles_each_escape() {
        assert_eq!(decode_string_literal(r#""a\nb""#), "a\nb");
        assert_eq!(decode_string_literal(r#""a\tb""#), "a\tb");
        assert_eq!(decode_string_literal(r#""a\\b""#), "a\\b");
        assert_eq!(decode_string_literal(r#""a\"b""#), "a\"b");
        assert_eq!(decode_string_literal(r#"'a\'b'"#), "a'b");
        assert_eq!(decode_string_literal(r#""a\qb""#), "aqb");
        assert_eq!(decode_string_literal(r#""""#), "");
    }

    #[test]
    fn and_or_short_circuit_and_return_booleans() {
        assert_eq!(run("echo true and 5").expect("run"), "true");
        assert_eq!(run("echo 0 and boom()").expect("run"), "false");
        assert_eq!(run("echo 1 or boom()").expect("run"), "true");
        assert_eq!(run("echo false or ''").expect("run"), "false");
    }

    #[test]
    fn equality_is_deep_for_aggregates() {
        assert_eq!(run("echo [1, [2]] == [1, [2]]").expect("run"), "true");
        assert_eq!(
            run(r#"echo {"a":1} == {"a":1} echo {"a":1} == {"a":2}"#).expect("run"),
            "truefalse"
        );
        assert_eq!(run("echo 1 == '1'").expect("run"), "false");
        assert_eq!(run("echo null == null").expect("run"), "true");
    }

    #[test]
    fn concat_uses_the_standard_formatter() {
        assert_eq!(
            run("echo 1 .. '-' .. true .. null .. [1]").expect("run"),
            "1-true[array]"
        );
    }

    #[test]
    fn modulo_follows_the_dividend_sign() {
        assert_eq!(run("echo -7 % 3").expect("run"), "-1");
        assert_eq!(run("echo 7 % -3").expect("run"), "1");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        expect_runtime_error("echo 1 / 0", "division by zero");
        expect_runtime_error("echo 1 % 0", "division by zero");
        expect_runtime_error("var x = 4; x /= 0", "division by zero");
    }

    #[test]
    fn arithmetic_requires_numbers() {
        expect_runtime_error("echo 1 + 'a'", "+ expects numbers");
        expect_runtime_error("echo 'a' < 'b'", "< expects numbers");
        expect_runtime_error("echo -'a'", "unary '-' expects numbers");
    }

    #[test]
    fn undefined_variables_are_reported_by_name() {
        expect_runtime_error("echo y", "undefined variable: y");
    }

    #[test]
    fn return_outside_function_is_an_error() {
        expect_runtime_error("return 1", "return outside of function");
        expect_runtime_error("while true return 1 end", "return outside of function");
    }

    #[test]
    fn calling_a_non_function_fails() {
        expect_runtime_error("var x = 3; x()", "attempt to call non-function value");
    }

    #[test]
    fn missing_arguments_bind_null_and_extras_are_dropped() {
        let source = indoc! {"
            function f(a, b) return is_null(b) end
            echo f(1)
            echo f(1, 2, 3)
        "};
        assert_eq!(run(source).expect("run"), "truefalse");
    }

    #[test]
    fn function_body_without_return_yields_null() {
        let source = "function f() end echo is_null(f())";
        assert_eq!(run(source).expect("run"), "true");
    }

    #[test]
    fn return_skips_the_rest_of_the_body() {
        let source = indoc! {"
            function f()
              return 7
              echo 'unreachable'
            end
            echo f()
        "};
        assert_eq!(run(source).expect("run"), "7");
    }

    #[test]
    fn var_redeclaration_shadows_in_the_same_frame() {
        assert_eq!(run("var x = 1; var x = 2; echo x").expect("run"), "2");
    }

    #[test]
    fn assignment_expression_yields_the_assigned_value() {
        assert_eq!(run_expr("x = 5").expect("eval"), Value::Number(5.0));
    }

    #[test]
    fn evaluation_is_deterministic_across_fresh_roots() {
        let source = r#"var o = {"b": [1,2], "a": 3}; for k,v in o echo k .. count(keys(o)) end"#;
        let first = run(source).expect("run");
        let second = run(source).expect("run");
        assert_eq!(first, second);
    }

    #[test]
    fn statements_after_error_do_not_run() {
        let root = Rc::new(RefCell::new(Env::new()));
        install_builtins(&mut root.borrow_mut());
        let mut interpreter = Interpreter::new(root, "test.pol");
        let tokens = tokenize("echo 'a'; echo boom; echo 'b'", "test.pol").expect("tokenize");
        let program = parse_program(tokens, "test.pol").expect("parse");
        interpreter
            .exec_program(&program)
            .expect_err("expected failure");
        // Output written before the failure stays observable.
        assert_eq!(interpreter.output(), "a");
    }
}
