//! Statement and control-flow lowering

use super::{attr_int, attr_str, CoreCompiler, LoopFrame};
use crate::context::GenContext;
use crate::error::{LowerError, LowerResult};
use tsir_ast::ast::*;
use tsir_ast::{build, Span};
use tsir_ir::{Attribute, OpKind, Value};
use tsir_types::{has_undefines, Type};

/// A for-of element binding waiting to be established inside the loop
/// body region.
pub(crate) struct ElementBinding {
    pub name: String,
    pub kind: VariableKind,
    pub array: Expression,
    pub index: tsir_ast::Symbol,
}

impl<'a> CoreCompiler<'a> {
    /// Lower a statement. Failure short-circuits the statement; the
    /// enclosing block still emits its successors.
    pub(crate) fn lower_stmt(&mut self, stmt: &Statement, ctx: &GenContext) -> LowerResult<()> {
        // No code lands after a terminator; type-level declarations are
        // still registered.
        if self.current_block_terminated() {
            let type_level = matches!(
                stmt,
                Statement::InterfaceDecl(_)
                    | Statement::TypeAliasDecl(_)
                    | Statement::EnumDecl(_)
                    | Statement::ImportEquals(_)
                    | Statement::ClassDecl(_)
            );
            if !type_level {
                return Ok(());
            }
        }
        match stmt {
            Statement::Block(block) => self.lower_block(block, ctx),
            Statement::Expression(expr_stmt) => {
                self.lower_expr(&expr_stmt.expression, ctx)?;
                Ok(())
            }
            Statement::VariableDecl(decl) => self.lower_variable_decl(decl, ctx),
            Statement::FunctionDecl(func) => self.lower_nested_function(func, ctx),
            Statement::ClassDecl(class) => self.lower_class_decl(class, ctx),
            Statement::InterfaceDecl(iface) => self.register_interface(iface, ctx),
            Statement::EnumDecl(decl) => self.lower_enum_decl(decl, ctx),
            Statement::TypeAliasDecl(decl) => self.lower_type_alias(decl, ctx),
            Statement::ImportEquals(decl) => self.lower_import_equals(decl, ctx),
            Statement::ModuleDecl(decl) => self.lower_module_decl(decl, ctx),
            Statement::If(if_stmt) => self.lower_if(if_stmt, ctx),
            Statement::While(while_stmt) => self.lower_while(while_stmt, ctx),
            Statement::DoWhile(do_while) => self.lower_do_while(do_while, ctx),
            Statement::For(for_stmt) => self.lower_for(for_stmt, ctx),
            Statement::ForIn(for_in) => self.lower_for_in(for_in, ctx),
            Statement::ForOf(for_of) => self.lower_for_of(for_of, ctx),
            Statement::Switch(switch) => self.lower_switch(switch, ctx),
            Statement::Labeled(labeled) => self.lower_labeled(labeled, ctx),
            Statement::Try(try_stmt) => self.lower_try(try_stmt, ctx),
            Statement::Throw(throw) => self.lower_throw(throw, ctx),
            Statement::Return(ret) => self.lower_return(ret, ctx),
            Statement::Break(brk) => self.lower_break(brk, ctx),
            Statement::Continue(cont) => self.lower_continue(cont, ctx),
            Statement::Empty(_) => Ok(()),
        }
    }

    /// Enter a scope; injected statements (safe-cast narrowing) are
    /// emitted ahead of the block body, then cleared.
    pub(crate) fn lower_block(&mut self, block: &BlockStatement, ctx: &GenContext) -> LowerResult<()> {
        self.symbols.enter_scope();
        let result = self.lower_block_body(&block.statements, ctx);
        self.symbols.leave_scope();
        result
    }

    pub(crate) fn lower_block_body(
        &mut self,
        statements: &[Statement],
        ctx: &GenContext,
    ) -> LowerResult<()> {
        let injected: Vec<Statement> = std::mem::take(&mut *ctx.generated_statements.borrow_mut());
        let mut first_error = None;
        for stmt in injected.iter().chain(statements.iter()) {
            if let Err(err) = self.lower_stmt(stmt, ctx) {
                // A failed statement does not stop its siblings, but the
                // failure propagates so the declaration reschedules.
                if first_error.is_none() {
                    first_error = Some(err);
                }
                if matches!(first_error, Some(LowerError::Unresolved { .. })) {
                    break;
                }
                continue;
            }

            // A guard whose then-branch always returns narrows the rest
            // of the block to the complementary arms.
            if let Statement::If(if_stmt) = stmt {
                if if_stmt.else_branch.is_none() && statement_terminates(&if_stmt.then_branch) {
                    let throwaway = ctx.for_block();
                    let (_, else_narrowed) =
                        self.narrowing_for_condition(&if_stmt.condition, &throwaway, ctx)?;
                    if let Some(redecl) = else_narrowed {
                        self.lower_stmt(&redecl, ctx)?;
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lower_if(&mut self, if_stmt: &IfStatement, ctx: &GenContext) -> LowerResult<()> {
        let condition = self.lower_expr(&if_stmt.condition, ctx)?;
        let condition = self.boolean_coerce(condition, if_stmt.span)?;

        let if_op = self
            .builder
            .create_op(OpKind::If, vec![condition.id], &[], vec![], 2, if_stmt.span);
        let then_region = self.builder.op(if_op).regions[0];
        let else_region = self.builder.op(if_op).regions[1];
        let then_block = self.builder.create_block(then_region, &[]);

        // Safe-cast narrowing redefines the tested name inside the
        // then-branch through an injected const declaration; guards over
        // unions narrow the else-branch to the complementary arms.
        let then_ctx = ctx.for_block();
        let else_ctx = ctx.for_block();
        let (then_narrowed, else_narrowed) =
            self.narrowing_for_condition(&if_stmt.condition, &then_ctx, &else_ctx)?;
        if let Some(narrowed) = then_narrowed {
            then_ctx.generated_statements.borrow_mut().push(narrowed);
        }

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(then_block);
        let then_result = self.lower_stmt(&if_stmt.then_branch, &then_ctx);
        self.builder.set_insertion_point(saved);
        then_result?;

        if let Some(else_branch) = &if_stmt.else_branch {
            let else_block = self.builder.create_block(else_region, &[]);
            if let Some(narrowed) = else_narrowed {
                else_ctx.generated_statements.borrow_mut().push(narrowed);
            }
            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(else_block);
            let else_result = self.lower_stmt(else_branch, &else_ctx);
            self.builder.set_insertion_point(saved);
            else_result?;
        }
        Ok(())
    }

    fn lower_while(&mut self, while_stmt: &WhileStatement, ctx: &GenContext) -> LowerResult<()> {
        let label = self.take_pending_label();
        let mut attrs = Vec::new();
        if let Some(label) = &label {
            attrs.push(attr_str("label", label));
        }
        let op = self
            .builder
            .create_op(OpKind::While, vec![], &[], attrs, 2, while_stmt.span);
        let cond_region = self.builder.op(op).regions[0];
        let body_region = self.builder.op(op).regions[1];
        let cond_block = self.builder.create_block(cond_region, &[]);
        let body_block = self.builder.create_block(body_region, &[]);

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(cond_block);
        let cond_result = self
            .lower_expr(&while_stmt.condition, ctx)
            .and_then(|cond| self.boolean_coerce(cond, while_stmt.span))
            .map(|cond| {
                self.emit_op(OpKind::ReturnVal, vec![cond.id], &[], vec![], while_stmt.span);
            });
        self.builder.set_insertion_point(saved);
        cond_result?;

        self.loop_stack.push(LoopFrame {
            label,
            is_switch: false,
        });
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body_block);
        let body_result = self.lower_loop_body(&while_stmt.body, ctx);
        self.builder.set_insertion_point(saved);
        self.loop_stack.pop();
        body_result
    }

    /// Loop body emission. A pending for-of element binding is
    /// established first; under `for await` each iteration body is
    /// submitted to the pending task group instead of run inline.
    fn lower_loop_body(&mut self, body: &Statement, ctx: &GenContext) -> LowerResult<()> {
        if let Some(binding) = self.pending_element_binding.take() {
            self.emit_element_binding(&binding, ctx)?;
        }
        match self.async_group.take() {
            Some(group) => {
                let op = self
                    .builder
                    .create_op(OpKind::SubmitAsync, vec![group], &[], vec![], 1, body.span());
                let region = self.builder.op(op).regions[0];
                let block = self.builder.create_block(region, &[]);
                let saved = self.builder.insertion_point();
                self.builder.set_insertion_point_to_end(block);
                let result = self.lower_stmt(body, &ctx.for_block());
                self.builder.set_insertion_point(saved);
                result
            }
            None => self.lower_stmt(body, &ctx.for_block()),
        }
    }

    fn lower_do_while(&mut self, do_while: &DoWhileStatement, ctx: &GenContext) -> LowerResult<()> {
        let label = self.take_pending_label();
        let mut attrs = Vec::new();
        if let Some(label) = &label {
            attrs.push(attr_str("label", label));
        }
        let op = self
            .builder
            .create_op(OpKind::DoWhile, vec![], &[], attrs, 2, do_while.span);
        let body_region = self.builder.op(op).regions[0];
        let cond_region = self.builder.op(op).regions[1];
        let body_block = self.builder.create_block(body_region, &[]);
        let cond_block = self.builder.create_block(cond_region, &[]);

        self.loop_stack.push(LoopFrame {
            label,
            is_switch: false,
        });
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body_block);
        let body_result = self.lower_stmt(&do_while.body, &ctx.for_block());
        self.builder.set_insertion_point(saved);
        self.loop_stack.pop();
        body_result?;

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(cond_block);
        let cond_result = self
            .lower_expr(&do_while.condition, ctx)
            .and_then(|cond| self.boolean_coerce(cond, do_while.span))
            .map(|cond| {
                self.emit_op(OpKind::ReturnVal, vec![cond.id], &[], vec![], do_while.span);
            });
        self.builder.set_insertion_point(saved);
        cond_result
    }

    fn lower_for(&mut self, for_stmt: &ForStatement, ctx: &GenContext) -> LowerResult<()> {
        let label = self.take_pending_label();
        let mut attrs = Vec::new();
        if let Some(label) = &label {
            attrs.push(attr_str("label", label));
        }

        // The init declaration scopes over the whole loop.
        self.symbols.enter_scope();

        let op = self
            .builder
            .create_op(OpKind::For, vec![], &[], attrs, 4, for_stmt.span);
        let init_region = self.builder.op(op).regions[0];
        let cond_region = self.builder.op(op).regions[1];
        let body_region = self.builder.op(op).regions[2];
        let incr_region = self.builder.op(op).regions[3];
        let init_block = self.builder.create_block(init_region, &[]);
        let cond_block = self.builder.create_block(cond_region, &[]);
        let body_block = self.builder.create_block(body_region, &[]);
        let incr_block = self.builder.create_block(incr_region, &[]);

        let result = (|| -> LowerResult<()> {
            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(init_block);
            let init_result = match &for_stmt.init {
                Some(ForInit::VariableDecl(decl)) => self.lower_variable_decl(decl, ctx),
                Some(ForInit::Expression(expr)) => self.lower_expr(expr, ctx).map(|_| ()),
                None => Ok(()),
            };
            self.builder.set_insertion_point(saved);
            init_result?;

            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(cond_block);
            let cond_result = match &for_stmt.test {
                Some(test) => self
                    .lower_expr(test, ctx)
                    .and_then(|cond| self.boolean_coerce(cond, for_stmt.span))
                    .map(|cond| {
                        self.emit_op(OpKind::ReturnVal, vec![cond.id], &[], vec![], for_stmt.span);
                    }),
                None => {
                    let always = self.emit_const_bool(true, for_stmt.span);
                    self.emit_op(OpKind::ReturnVal, vec![always.id], &[], vec![], for_stmt.span);
                    Ok(())
                }
            };
            self.builder.set_insertion_point(saved);
            cond_result?;

            self.loop_stack.push(LoopFrame {
                label,
                is_switch: false,
            });
            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(body_block);
            let body_result = self.lower_loop_body(&for_stmt.body, ctx);
            self.builder.set_insertion_point(saved);
            self.loop_stack.pop();
            body_result?;

            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(incr_block);
            let incr_result = match &for_stmt.update {
                Some(update) => self.lower_expr(update, ctx).map(|_| ()),
                None => Ok(()),
            };
            self.builder.set_insertion_point(saved);
            incr_result
        })();

        self.symbols.leave_scope();
        result
    }

    /// `for (k in a)` lowers into a numeric for over `[0, a.length)`.
    fn lower_for_in(&mut self, for_in: &ForInStatement, ctx: &GenContext) -> LowerResult<()> {
        let Some(binding) = for_in.binding.as_identifier() else {
            return self.structural_error(for_in.span, "for-in binding must be an identifier");
        };
        let rewritten = self.numeric_for(
            binding.name,
            &for_in.object,
            (*for_in.body).clone(),
            for_in.span,
        );
        self.lower_stmt(&rewritten, ctx)
    }

    /// `for (x of a)`: the ES2015 iterator protocol when the iterand has
    /// a `next` member, else an indexed loop binding the element.
    fn lower_for_of(&mut self, for_of: &ForOfStatement, ctx: &GenContext) -> LowerResult<()> {
        if for_of.is_await {
            return self.lower_for_await(for_of, ctx);
        }
        let Some(binding) = for_of.binding.as_identifier() else {
            return self.structural_error(for_of.span, "for-of binding must be an identifier");
        };

        let iterand = self.lower_expr(&for_of.iterable, ctx)?;
        if self.type_has_next(iterand.ty) {
            let rewritten = self.iterator_protocol_loop(for_of)?;
            return self.lower_stmt(&rewritten, ctx);
        }

        // Indexed element loop; the binding is established inside the
        // body region (const bindings alias the element storage).
        let index_name = self.intern_fresh("_i");
        let rewritten = self.numeric_for(
            index_name,
            &for_of.iterable,
            (*for_of.body).clone(),
            for_of.span,
        );
        self.pending_element_binding = Some(ElementBinding {
            name: self.interner.resolve(binding.name).to_string(),
            kind: for_of.kind,
            array: for_of.iterable.clone(),
            index: index_name,
        });
        let result = self.lower_stmt(&rewritten, ctx);
        self.pending_element_binding = None;
        result
    }

    /// Synthesized numeric loop: `for (let i = 0; i < a.length; i++)`.
    fn numeric_for(
        &mut self,
        index_name: tsir_ast::Symbol,
        iterand: &Expression,
        body: Statement,
        span: Span,
    ) -> Statement {
        let length_sym = self.interner.intern("length");
        let test = build::binary(
            BinaryOperator::Less,
            build::ident_expr(index_name),
            build::member(iterand.clone(), length_sym),
        );
        let update = Expression::Update(UpdateExpression {
            increment: true,
            prefix: false,
            operand: Box::new(build::ident_expr(index_name)),
            span,
        });

        Statement::For(ForStatement {
            init: Some(ForInit::VariableDecl(VariableDecl {
                kind: VariableKind::Let,
                declarations: vec![Declarator {
                    pattern: Pattern::Identifier(build::ident(index_name)),
                    type_annotation: None,
                    initializer: Some(build::int(0)),
                    span,
                }],
                span,
            })),
            test: Some(test),
            update: Some(update),
            body: Box::new(Statement::Block(build::block(vec![body]))),
            span,
        })
    }

    /// `b = iter; c = b.next(); while (!c.done) { x = c.value; …;
    /// c = b.next(); }`
    fn iterator_protocol_loop(&mut self, for_of: &ForOfStatement) -> LowerResult<Statement> {
        let binding = for_of
            .binding
            .as_identifier()
            .expect("checked by caller");
        let iter_sym = self.intern_fresh("_iter");
        let step_sym = self.intern_fresh("_step");
        let next_sym = self.interner.intern("next");
        let done_sym = self.interner.intern("done");
        let value_sym = self.interner.intern("value");

        let decl_iter = build::const_decl(iter_sym, None, for_of.iterable.clone());
        let decl_step = build::let_decl(
            step_sym,
            None,
            Some(build::call(
                build::member(build::ident_expr(iter_sym), next_sym),
                vec![],
            )),
        );

        let not_done = build::unary(
            UnaryOperator::Not,
            build::member(build::ident_expr(step_sym), done_sym),
        );
        let bind_value = build::var_decl(
            for_of.kind,
            binding.name,
            None,
            Some(build::member(build::ident_expr(step_sym), value_sym)),
        );
        let advance = build::expr_stmt(build::assign(
            build::ident_expr(step_sym),
            build::call(build::member(build::ident_expr(iter_sym), next_sym), vec![]),
        ));

        let loop_body = build::block(vec![bind_value, (*for_of.body).clone(), advance]);
        let while_loop = build::while_stmt(not_done, Statement::Block(loop_body));

        Ok(Statement::Block(build::block(vec![
            decl_iter, decl_step, while_loop,
        ])))
    }

    /// `for await`: each iteration body becomes a task submitted to a
    /// group; the loop blocks only at the final await-all.
    fn lower_for_await(&mut self, for_of: &ForOfStatement, ctx: &GenContext) -> LowerResult<()> {
        if !self.opts.enable_async {
            return self.structural_error(for_of.span, "'for await' requires async support");
        }
        let opaque = self.types.opaque();
        let group = self.emit_op(OpKind::CreateTaskGroup, vec![], &[opaque], vec![], for_of.span);
        let group = self.builder.result(group);

        let wrapped_body = Statement::Block(build::block(vec![(*for_of.body).clone()]));
        let inner = ForOfStatement {
            kind: for_of.kind,
            binding: for_of.binding.clone(),
            iterable: for_of.iterable.clone(),
            body: Box::new(wrapped_body),
            is_await: false,
            span: for_of.span,
        };

        // Lower the iteration with the body routed through a submit op.
        self.async_group = Some(group.id);
        let result = self.lower_for_of(&inner, ctx);
        self.async_group = None;
        result?;

        self.emit_op(OpKind::AwaitAll, vec![group.id], &[], vec![], for_of.span);
        Ok(())
    }

    fn lower_switch(&mut self, switch: &SwitchStatement, ctx: &GenContext) -> LowerResult<()> {
        let discriminant = self.lower_expr(&switch.discriminant, ctx)?;

        // Default region is linked last.
        let mut ordered: Vec<&SwitchCase> = switch.cases.iter().filter(|c| c.test.is_some()).collect();
        let default: Option<&SwitchCase> = switch.cases.iter().find(|c| c.test.is_none());
        if let Some(default) = default {
            ordered.push(default);
        }

        let mut case_values: Vec<Attribute> = Vec::new();
        let mut case_tests: Vec<Option<Value>> = Vec::new();
        for case in &ordered {
            match &case.test {
                Some(test) => {
                    let value = self.lower_expr(test, ctx)?;
                    case_values.push(Attribute::Int(case_tests.len() as i64));
                    case_tests.push(Some(value));
                }
                None => {
                    case_values.push(Attribute::Unit);
                    case_tests.push(None);
                }
            }
        }

        let mut operands = vec![discriminant.id];
        operands.extend(case_tests.iter().flatten().map(|v| v.id));

        let num_regions = ordered.len() + 1; // cases + merge
        let op = self.builder.create_op(
            OpKind::Switch,
            operands,
            &[],
            vec![("cases".to_string(), Attribute::List(case_values))],
            num_regions,
            switch.span,
        );

        self.loop_stack.push(LoopFrame {
            label: None,
            is_switch: true,
        });
        let mut result = Ok(());
        for (index, case) in ordered.iter().enumerate() {
            let region = self.builder.op(op).regions[index];
            let block = self.builder.create_block(region, &[]);
            let case_ctx = ctx.for_block();

            // A literal case over a discriminated member narrows within
            // its body.
            if let Some(test) = &case.test {
                if let Some(narrowed) =
                    self.narrowing_for_case(&switch.discriminant, test, &case_ctx)?
                {
                    case_ctx.generated_statements.borrow_mut().push(narrowed);
                }
            }

            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(block);
            self.symbols.enter_scope();
            let case_result = self.lower_block_body(&case.consequent, &case_ctx);
            self.symbols.leave_scope();
            self.builder.set_insertion_point(saved);
            if result.is_ok() {
                result = case_result;
            }
        }
        self.loop_stack.pop();

        // Merge region.
        let merge_region = self.builder.op(op).regions[ordered.len()];
        self.builder.create_block(merge_region, &[]);
        result
    }

    fn lower_labeled(&mut self, labeled: &LabeledStatement, ctx: &GenContext) -> LowerResult<()> {
        let label = self.interner.resolve(labeled.label.name).to_string();

        // Pseudo-labels beginning with `state` are generator re-entry
        // markers.
        if let Some(ordinal) = label.strip_prefix("state").and_then(|s| s.parse::<i64>().ok()) {
            self.emit_op(
                OpKind::StateLabel,
                vec![],
                &[],
                vec![attr_int("state", ordinal)],
                labeled.span,
            );
            return self.lower_stmt(&labeled.body, ctx);
        }

        // A label wrapping a loop rides on the loop op itself.
        if matches!(
            labeled.body.as_ref(),
            Statement::While(_)
                | Statement::DoWhile(_)
                | Statement::For(_)
                | Statement::ForIn(_)
                | Statement::ForOf(_)
        ) {
            self.pending_label = Some(label);
            return self.lower_stmt(&labeled.body, ctx);
        }

        let op = self.builder.create_op(
            OpKind::Labeled,
            vec![],
            &[],
            vec![attr_str("label", &label)],
            1,
            labeled.span,
        );
        let region = self.builder.op(op).regions[0];
        let block = self.builder.create_block(region, &[]);
        self.loop_stack.push(LoopFrame {
            label: Some(label),
            is_switch: true,
        });
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(block);
        let result = self.lower_stmt(&labeled.body, &ctx.for_block());
        self.builder.set_insertion_point(saved);
        self.loop_stack.pop();
        result
    }

    fn lower_try(&mut self, try_stmt: &TryStatement, ctx: &GenContext) -> LowerResult<()> {
        if let Some(frame) = self.current_frame_mut() {
            frame.has_personality = true;
        }

        let num_regions = 1
            + usize::from(try_stmt.catch_clause.is_some())
            + usize::from(try_stmt.finally_clause.is_some());
        let handler = if self.opts.win_exception { "win32" } else { "itanium" };
        let op = self.builder.create_op(
            OpKind::Try,
            vec![],
            &[],
            vec![attr_str("handler", handler)],
            num_regions,
            try_stmt.span,
        );

        let body_region = self.builder.op(op).regions[0];
        let body_block = self.builder.create_block(body_region, &[]);
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body_block);
        let body_result = self.lower_block(&try_stmt.body, &ctx.for_block());
        self.builder.set_insertion_point(saved);
        body_result?;

        let mut region_index = 1;
        if let Some(catch) = &try_stmt.catch_clause {
            let catch_ty = match &catch.type_annotation {
                Some(annotation) => self.resolve_type(annotation, ctx)?,
                None => self.types.any(),
            };
            let catch_region = self.builder.op(op).regions[region_index];
            let catch_block = self.builder.create_block(catch_region, &[catch_ty]);
            region_index += 1;

            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(catch_block);
            self.symbols.enter_scope();

            let catch_result = (|| -> LowerResult<()> {
                if let Some(param) = &catch.param {
                    let name = self.interner.resolve(param.name).to_string();
                    let caught = self.builder.module().block_arg(catch_block, 0);
                    // The catch op binds the caught value in the region.
                    let bound = self.emit_op(
                        OpKind::Catch,
                        vec![caught.id],
                        &[catch_ty],
                        vec![attr_str("name", &name)],
                        catch.span,
                    );
                    let bound = self.builder.result(bound);
                    self.declare_value_binding(&name, bound, false, catch.span)?;
                }
                self.lower_block_body(&catch.body.statements, &ctx.for_block())
            })();

            self.symbols.leave_scope();
            self.builder.set_insertion_point(saved);
            catch_result?;
        }

        if let Some(finally) = &try_stmt.finally_clause {
            let finally_region = self.builder.op(op).regions[region_index];
            let finally_block = self.builder.create_block(finally_region, &[]);
            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_end(finally_block);
            let finally_result = self.lower_block(finally, &ctx.for_block());
            self.builder.set_insertion_point(saved);
            finally_result?;
        }

        Ok(())
    }

    fn lower_throw(&mut self, throw: &ThrowStatement, ctx: &GenContext) -> LowerResult<()> {
        if let Some(frame) = self.current_frame_mut() {
            frame.has_personality = true;
        }
        let value = self.lower_expr(&throw.value, ctx)?;
        let mut attrs = Vec::new();
        if !ctx.dummy_run {
            // The definitive pass registers RTTI for the thrown type.
            let shown = self.types.display(value.ty);
            attrs.push(attr_str("rtti", &shown));
            if self.opts.win_exception {
                attrs.push(attr_str("handler", "win32"));
            }
        }
        self.emit_op(OpKind::Throw, vec![value.id], &[], attrs, throw.span);
        Ok(())
    }

    fn lower_return(&mut self, ret: &ReturnStatement, ctx: &GenContext) -> LowerResult<()> {
        let value = match &ret.value {
            Some(expr) => Some(self.lower_expr(expr, ctx)?),
            None => None,
        };

        // Merge into the return-type sink during discovery.
        if let Some(sink) = ctx.return_type_sink.clone() {
            let mut acc = sink.borrow_mut();
            if value.is_none() && acc.required {
                // Mixing bare and valued returns cannot unify.
                let void = self.types.void();
                if let Some(prev) = acc.ty {
                    acc.conflict = Some((prev, void, ret.span));
                }
            }
            if let Some(value) = value {
                acc.required = true;
                match acc.ty {
                    None => acc.ty = Some(self.types.widen(value.ty)),
                    Some(prev) => {
                        let next = self.types.widen(value.ty);
                        // Types containing undefined never override a
                        // concrete type.
                        if has_undefines(&self.types, next) && !has_undefines(&self.types, prev) {
                            // keep prev
                        } else if has_undefines(&self.types, prev)
                            && !has_undefines(&self.types, next)
                        {
                            acc.ty = Some(next);
                        } else if prev != next {
                            // One-directional castability picks the wider
                            // type; otherwise the return sites unify as a
                            // union.
                            let never = self.types.never();
                            let merged = self.base_type(prev, next, never);
                            if merged == never {
                                acc.ty = Some(self.types.union(vec![prev, next]));
                            } else {
                                acc.ty = Some(merged);
                            }
                        }
                    }
                }
            }
        }

        let return_ty = self.current_frame().map(|f| f.return_ty);
        match (value, return_ty) {
            (Some(value), Some(declared)) => {
                let undef_placeholder = self.types.undef_placeholder();
                let value = if declared == undef_placeholder {
                    value
                } else {
                    self.coerce(value, declared, ret.span)?
                };
                self.emit_op(OpKind::ReturnVal, vec![value.id], &[], vec![], ret.span);
            }
            (Some(value), None) => {
                self.emit_op(OpKind::ReturnVal, vec![value.id], &[], vec![], ret.span);
            }
            (None, _) => {
                self.emit_op(OpKind::ReturnVal, vec![], &[], vec![], ret.span);
            }
        }
        Ok(())
    }

    fn lower_break(&mut self, brk: &BreakStatement, ctx: &GenContext) -> LowerResult<()> {
        let _ = ctx;
        let label = brk
            .label
            .map(|l| self.interner.resolve(l.name).to_string());
        let bound = match &label {
            Some(name) => self
                .loop_stack
                .iter()
                .any(|frame| frame.label.as_deref() == Some(name)),
            None => !self.loop_stack.is_empty(),
        };
        if !bound {
            return self.structural_error(brk.span, "'break' outside of a breakable statement");
        }
        let mut attrs = Vec::new();
        if let Some(label) = &label {
            attrs.push(attr_str("label", label));
        }
        self.emit_op(OpKind::Break, vec![], &[], attrs, brk.span);
        Ok(())
    }

    fn lower_continue(&mut self, cont: &ContinueStatement, ctx: &GenContext) -> LowerResult<()> {
        let _ = ctx;
        let label = cont
            .label
            .map(|l| self.interner.resolve(l.name).to_string());
        let bound = match &label {
            Some(name) => self
                .loop_stack
                .iter()
                .any(|frame| !frame.is_switch && frame.label.as_deref() == Some(name)),
            None => self.loop_stack.iter().any(|frame| !frame.is_switch),
        };
        if !bound {
            return self.structural_error(cont.span, "'continue' outside of a loop");
        }
        let mut attrs = Vec::new();
        if let Some(label) = &label {
            attrs.push(attr_str("label", label));
        }
        self.emit_op(OpKind::Continue, vec![], &[], attrs, cont.span);
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Bind the for-of element inside the loop body: a const binding
    /// aliases the element storage (writes through the source array stay
    /// visible), a let binding copies the element into a local slot.
    fn emit_element_binding(&mut self, binding: &ElementBinding, ctx: &GenContext) -> LowerResult<()> {
        let span = binding.array.span();
        let array = self.lower_expr(&binding.array, ctx)?;
        let index_name = self.interner.resolve(binding.index).to_string();
        let index = self.resolve_identifier(&index_name, span, ctx)?;

        let elem_ty = match self.types.get(array.ty) {
            Type::Array(e) | Type::ConstArray { element: e, .. } => *e,
            _ => self.types.any(),
        };
        let ref_ty = self.types.reference(elem_ty);
        let elem_ref = self.emit_op(
            OpKind::ElementRef,
            vec![array.id, index.id],
            &[ref_ty],
            vec![],
            span,
        );
        let elem_ref = self.builder.result(elem_ref);

        if binding.kind == VariableKind::Const {
            self.declare_const_ref(&binding.name, elem_ref, span)
        } else {
            let value = self.emit_load(elem_ref.id, elem_ty, span);
            let slot = self.emit_op(
                OpKind::Variable,
                vec![value.id],
                &[ref_ty],
                vec![attr_str("name", &binding.name)],
                span,
            );
            let slot = self.builder.result(slot);
            let info = crate::symbols::VariableInfo {
                name: binding.name.clone(),
                full_name: binding.name.clone(),
                ty: elem_ty,
                location: span,
                read_write: true,
                storage: crate::symbols::VarStorage::Local(slot.id),
                func_level: 0,
            };
            if self.symbols.declare(&binding.name, info, true).is_err() {
                return self.structural_error(
                    span,
                    format!("'{}' is already declared", binding.name),
                );
            }
            Ok(())
        }
    }

    pub(crate) fn take_pending_label(&mut self) -> Option<String> {
        self.pending_label.take()
    }

    pub(crate) fn intern_fresh(&mut self, prefix: &str) -> tsir_ast::Symbol {
        let name = self.fresh_name(prefix);
        self.interner.intern(&name)
    }

    /// Whether the type exposes a `next` member (iterator protocol).
    fn type_has_next(&self, ty: tsir_types::TypeId) -> bool {
        match self.types.get(ty) {
            Type::Class { name, .. } => self
                .class_by_fqn
                .get(name)
                .map(|&id| self.class(id).method("next").is_some())
                .unwrap_or(false),
            Type::Object(storage) => self
                .types
                .get(*storage)
                .as_tuple_fields()
                .map(|fields| fields.iter().any(|f| f.id.as_name() == Some("next")))
                .unwrap_or(false),
            Type::Tuple(fields) | Type::ConstTuple(fields) => {
                fields.iter().any(|f| f.id.as_name() == Some("next"))
            }
            Type::Interface { name } => self
                .iface_by_fqn
                .get(name)
                .map(|&id| self.interface(id).member("next").is_some())
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Whether control cannot fall out of the statement.
fn statement_terminates(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return(_) | Statement::Throw(_) => true,
        Statement::Block(block) => block
            .statements
            .last()
            .map(statement_terminates)
            .unwrap_or(false),
        Statement::If(if_stmt) => if_stmt
            .else_branch
            .as_ref()
            .map(|e| statement_terminates(e) && statement_terminates(&if_stmt.then_branch))
            .unwrap_or(false),
        _ => false,
    }
}
