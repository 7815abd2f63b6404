use std::collections::{HashMap, HashSet};

use inflector::Inflector;
use swc_core::common::{Mark, Span, SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::utils::find_pat_ids;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use swc_core::quote;

/// Rewrites ES module syntax into the CommonJS the module loader runs.
///
/// Imports become `var _src = require("src")` and every use of an imported
/// binding reads through that object, so cyclic imports observe live values.
/// Exported declarations are published on `exports` with getters installed
/// before any require runs, `export const` is assigned after its
/// declaration.
pub struct EsmToCjsReplacer {
  // Imported binding to (source, imported name)
  imports: HashMap<Id, (Atom, Atom)>,
  // Source to (require binding name, mark)
  require_names: HashMap<Atom, (Atom, Mark)>,
  // Sources with a default interop binding
  interops: HashSet<Atom>,
  requires: Vec<ModuleItem>,
  exports: Vec<ModuleItem>,
  in_function_scope: bool,
  unresolved_mark: Mark,
}

fn local_name_for_src(src: &Atom) -> Atom {
  let last = src.rsplit('/').next().unwrap_or(src);
  let name = last.trim_start_matches('@').to_camel_case();
  if name.is_empty() {
    "_module".into()
  } else {
    format!("_{name}").into()
  }
}

fn export_name(name: &ModuleExportName) -> Atom {
  match name {
    ModuleExportName::Ident(ident) => ident.sym.clone(),
    ModuleExportName::Str(s) => s.value.clone(),
  }
}

fn declared_idents(var: &VarDecl) -> Vec<Ident> {
  var
    .decls
    .iter()
    .flat_map(|decl| find_pat_ids::<_, Ident>(&decl.name))
    .collect()
}

fn exports_ident() -> Ident {
  Ident::new_no_ctxt("exports".into(), DUMMY_SP)
}

impl EsmToCjsReplacer {
  pub fn new(unresolved_mark: Mark) -> Self {
    EsmToCjsReplacer {
      imports: HashMap::new(),
      require_names: HashMap::new(),
      interops: HashSet::new(),
      requires: vec![],
      exports: vec![],
      in_function_scope: false,
      unresolved_mark,
    }
  }

  fn get_require_name(&mut self, src: &Atom, span: Span) -> Ident {
    if let Some((name, mark)) = self.require_names.get(src) {
      return Ident::new(name.clone(), span, SyntaxContext::empty().apply_mark(*mark));
    }

    let name = local_name_for_src(src);
    let mark = Mark::fresh(Mark::root());
    self.require_names.insert(src.clone(), (name.clone(), mark));
    Ident::new(name, span, SyntaxContext::empty().apply_mark(mark))
  }

  fn get_interop_default_name(&mut self, src: &Atom) -> Ident {
    let require_name = self.get_require_name(src, DUMMY_SP);
    Ident::new(
      format!("{}Default", require_name.sym).into(),
      DUMMY_SP,
      require_name.ctxt,
    )
  }

  fn create_require(&mut self, src: &Atom, span: Span) {
    if self.require_names.contains_key(src) {
      return;
    }

    let ident = self.get_require_name(src, span);
    let require = Ident::new(
      "require".into(),
      DUMMY_SP,
      SyntaxContext::empty().apply_mark(self.unresolved_mark),
    );
    self.requires.push(ModuleItem::Stmt(quote!(
      "var $ident = $require($src);" as Stmt,
      ident: Ident = ident,
      require: Ident = require,
      src: Expr = Expr::Lit(Lit::Str(src.clone().into())),
    )));
  }

  fn create_interop_default(&mut self, src: &Atom) {
    if !self.interops.insert(src.clone()) {
      return;
    }

    let module = self.get_require_name(src, DUMMY_SP);
    let ident = self.get_interop_default_name(src);
    self.requires.push(ModuleItem::Stmt(quote!(
      "var $ident = $module && $module.__esModule ? $module : { default: $module };" as Stmt,
      ident: Ident = ident,
      module: Ident = module,
    )));
  }

  /// Live binding on `exports`, installed before the module body runs
  fn create_export(&mut self, exported: Atom, local: Expr) {
    self.exports.push(ModuleItem::Stmt(quote!(
      "Object.defineProperty($exports, $name, { enumerable: true, get: function () { return $local; } });"
        as Stmt,
      exports: Ident = exports_ident(),
      name: Expr = Expr::Lit(Lit::Str(exported.into())),
      local: Expr = local,
    )));
  }

  fn create_exports_assign(&self, name: Atom, right: Expr, span: Span) -> ModuleItem {
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
      expr: Box::new(Expr::Assign(AssignExpr {
        op: AssignOp::Assign,
        left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
          obj: Box::new(Expr::Ident(exports_ident())),
          prop: MemberProp::Computed(ComputedPropName {
            span: DUMMY_SP,
            expr: Box::new(Expr::Lit(Lit::Str(name.into()))),
          }),
          span: DUMMY_SP,
        })),
        right: Box::new(right),
        span: DUMMY_SP,
      })),
      span,
    }))
  }

  fn create_import_access(&mut self, source: &Atom, imported: &Atom, span: Span) -> Expr {
    if imported == "*" {
      return Expr::Ident(self.get_require_name(source, span));
    }

    let obj = if imported == "default" {
      self.get_interop_default_name(source)
    } else {
      self.get_require_name(source, DUMMY_SP)
    };

    // (0, _source.name) so calls are not bound to the module object
    Expr::Seq(SeqExpr {
      exprs: vec![
        0.into(),
        Box::new(Expr::Member(MemberExpr {
          obj: Box::new(Expr::Ident(obj)),
          prop: MemberProp::Computed(ComputedPropName {
            span: DUMMY_SP,
            expr: Box::new(Expr::Lit(Lit::Str(imported.clone().into()))),
          }),
          span,
        })),
      ],
      span,
    })
  }

  fn collect_import(&mut self, import: &ImportDecl) {
    let src = import.src.value.clone();
    self.create_require(&src, import.span);

    for specifier in &import.specifiers {
      match specifier {
        ImportSpecifier::Named(named) => {
          let imported = match &named.imported {
            Some(imported) => export_name(imported),
            None => named.local.sym.clone(),
          };
          if imported == "default" {
            self.create_interop_default(&src);
          }
          self
            .imports
            .insert(named.local.to_id(), (src.clone(), imported));
        }
        ImportSpecifier::Default(default) => {
          self.create_interop_default(&src);
          self
            .imports
            .insert(default.local.to_id(), (src.clone(), "default".into()));
        }
        ImportSpecifier::Namespace(namespace) => {
          self
            .imports
            .insert(namespace.local.to_id(), (src.clone(), "*".into()));
        }
      }
    }
  }

  fn collect_reexport(&mut self, export: &NamedExport, src: &Atom) {
    self.create_require(src, export.span);

    for specifier in &export.specifiers {
      match specifier {
        ExportSpecifier::Named(named) => {
          let orig = export_name(&named.orig);
          let exported = named.exported.as_ref().map(export_name).unwrap_or(orig.clone());
          if orig == "default" {
            self.create_interop_default(src);
          }
          let access = self.create_import_access(src, &orig, DUMMY_SP);
          self.create_export(exported, access);
        }
        ExportSpecifier::Default(default) => {
          self.create_interop_default(src);
          let access = self.create_import_access(src, &"default".into(), DUMMY_SP);
          self.create_export(default.exported.sym.clone(), access);
        }
        ExportSpecifier::Namespace(namespace) => {
          let local = self.get_require_name(src, DUMMY_SP);
          self.create_export(export_name(&namespace.name), Expr::Ident(local));
        }
      }
    }
  }

  fn collect_export_all(&mut self, export: &ExportAll) {
    let src = export.src.value.clone();
    self.create_require(&src, export.span);
    let module = self.get_require_name(&src, export.span);
    self.requires.push(ModuleItem::Stmt(quote!(
      r#"
      Object.keys($module).forEach(function (key) {
        if (key === "default" || key === "__esModule" || Object.prototype.hasOwnProperty.call($exports, key)) return;
        Object.defineProperty($exports, key, { enumerable: true, get: function () { return $module[key]; } });
      });
      "# as Stmt,
      module: Ident = module,
      exports: Ident = exports_ident(),
    )));
  }

  fn export_declaration(&mut self, decl: &Decl, items: &mut Vec<ModuleItem>) {
    match decl {
      Decl::Class(class) => {
        self.create_export(class.ident.sym.clone(), Expr::Ident(class.ident.clone()));
      }
      Decl::Fn(func) => {
        self.create_export(func.ident.sym.clone(), Expr::Ident(func.ident.clone()));
      }
      Decl::Var(var) if var.kind == VarDeclKind::Const => {
        items.push(ModuleItem::Stmt(Stmt::Decl(decl.clone())));
        for ident in declared_idents(var) {
          items.push(self.create_exports_assign(ident.sym.clone(), Expr::Ident(ident), DUMMY_SP));
        }
        return;
      }
      Decl::Var(var) => {
        for ident in declared_idents(var) {
          self.create_export(ident.sym.clone(), Expr::Ident(ident));
        }
      }
      _ => {}
    }
    items.push(ModuleItem::Stmt(Stmt::Decl(decl.clone())));
  }

  fn export_default_declaration(&mut self, export: &ExportDefaultDecl, items: &mut Vec<ModuleItem>) {
    match &export.decl {
      DefaultDecl::Class(class) => match &class.ident {
        Some(ident) => {
          items.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
            ident: ident.clone(),
            declare: false,
            class: class.class.clone(),
          }))));
          items.push(self.create_exports_assign(
            "default".into(),
            Expr::Ident(ident.clone()),
            DUMMY_SP,
          ));
        }
        None => items.push(self.create_exports_assign(
          "default".into(),
          Expr::Class(class.clone()),
          export.span,
        )),
      },
      DefaultDecl::Fn(func) => match &func.ident {
        Some(ident) => {
          items.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
            ident: ident.clone(),
            declare: false,
            function: func.function.clone(),
          }))));
          self.create_export("default".into(), Expr::Ident(ident.clone()));
        }
        None => items.push(self.create_exports_assign(
          "default".into(),
          Expr::Fn(func.clone()),
          export.span,
        )),
      },
      DefaultDecl::TsInterfaceDecl(_) => {}
    }
  }
}

macro_rules! visit_function_scope {
  ($name:ident, $type:ident) => {
    fn $name(&mut self, node: &mut $type) {
      let in_function_scope = self.in_function_scope;
      self.in_function_scope = true;
      node.visit_mut_children_with(self);
      self.in_function_scope = in_function_scope;
    }
  };
}

impl VisitMut for EsmToCjsReplacer {
  fn visit_mut_module(&mut self, node: &mut Module) {
    let mut is_esm = false;
    let mut has_exports = false;

    // Imports and re-exports first, so exports of imported bindings can be
    // matched in the second pass
    for item in &node.body {
      let ModuleItem::ModuleDecl(decl) = item else {
        continue;
      };
      is_esm = true;
      match decl {
        ModuleDecl::Import(import) => self.collect_import(import),
        ModuleDecl::ExportNamed(export) => {
          has_exports = true;
          if let Some(src) = &export.src {
            let src = src.value.clone();
            self.collect_reexport(export, &src);
          }
        }
        ModuleDecl::ExportAll(export) => {
          has_exports = true;
          self.collect_export_all(export);
        }
        ModuleDecl::ExportDecl(_)
        | ModuleDecl::ExportDefaultDecl(_)
        | ModuleDecl::ExportDefaultExpr(_) => has_exports = true,
        _ => {}
      }
    }

    if !is_esm {
      return;
    }

    node.visit_mut_children_with(self);
    let mut items = vec![];

    for item in &node.body {
      let ModuleItem::ModuleDecl(decl) = item else {
        items.push(item.clone());
        continue;
      };
      match decl {
        ModuleDecl::Import(_) | ModuleDecl::ExportAll(_) => {}
        ModuleDecl::ExportNamed(export) if export.src.is_none() => {
          for specifier in &export.specifiers {
            let ExportSpecifier::Named(named) = specifier else {
              continue;
            };
            let exported = named
              .exported
              .as_ref()
              .map(export_name)
              .unwrap_or_else(|| export_name(&named.orig));
            let ModuleExportName::Ident(orig) = &named.orig else {
              continue;
            };

            // import { a } from 'b'; export { a };
            let value = match self.imports.get(&orig.to_id()).cloned() {
              Some((source, imported)) => self.create_import_access(&source, &imported, orig.span),
              None => Expr::Ident(orig.clone()),
            };
            self.create_export(exported, value);
          }
        }
        ModuleDecl::ExportNamed(_) => {}
        ModuleDecl::ExportDefaultExpr(export) => items.push(self.create_exports_assign(
          "default".into(),
          *export.expr.clone(),
          export.span,
        )),
        ModuleDecl::ExportDefaultDecl(export) => self.export_default_declaration(export, &mut items),
        ModuleDecl::ExportDecl(export) => self.export_declaration(&export.decl, &mut items),
        _ => items.push(item.clone()),
      }
    }

    if has_exports {
      self.exports.insert(
        0,
        ModuleItem::Stmt(quote!(
          "Object.defineProperty($exports, \"__esModule\", { value: true });" as Stmt,
          exports: Ident = exports_ident(),
        )),
      );
    }

    items.splice(0..0, std::mem::take(&mut self.requires));
    items.splice(0..0, std::mem::take(&mut self.exports));
    node.body = items;
  }

  visit_function_scope!(visit_mut_function, Function);
  visit_function_scope!(visit_mut_class, Class);
  visit_function_scope!(visit_mut_getter_prop, GetterProp);
  visit_function_scope!(visit_mut_setter_prop, SetterProp);

  fn visit_mut_expr(&mut self, node: &mut Expr) {
    match node {
      Expr::Ident(ident) => {
        if let Some((source, imported)) = self.imports.get(&ident.to_id()).cloned() {
          let span = ident.span;
          *node = self.create_import_access(&source, &imported, span);
        }
      }
      Expr::This(this) if !self.in_function_scope => {
        let span = this.span;
        *node = Expr::Ident(Ident::new(
          "undefined".into(),
          span,
          SyntaxContext::empty().apply_mark(self.unresolved_mark),
        ));
      }
      _ => node.visit_mut_children_with(self),
    }
  }

  fn visit_mut_prop(&mut self, node: &mut Prop) {
    // { a } -> { a: _source.a }
    if let Prop::Shorthand(ident) = node {
      if let Some((source, imported)) = self.imports.get(&ident.to_id()).cloned() {
        let key = PropName::Ident(IdentName::new(ident.sym.clone(), DUMMY_SP));
        let span = ident.span;
        *node = Prop::KeyValue(KeyValueProp {
          key,
          value: Box::new(self.create_import_access(&source, &imported, span)),
        });
        return;
      }
    }

    node.visit_mut_children_with(self);
  }

  fn visit_mut_member_expr(&mut self, node: &mut MemberExpr) {
    node.obj.visit_mut_with(self);

    if let MemberProp::Computed(_) = node.prop {
      node.prop.visit_mut_with(self);
    }
  }
}

#[cfg(test)]
mod tests {
  use linaria_swc_runner::test_utils::{remove_code_whitespace, run_test_visit};

  use super::*;

  fn transform(code: &str) -> String {
    let result = run_test_visit(code, |context| EsmToCjsReplacer::new(context.unresolved_mark));
    remove_code_whitespace(&result.output_code)
  }

  #[test]
  fn test_imports_read_through_the_required_module() {
    let output = transform(
      r#"
        import { useEffect } from 'react';
        import theme from '../theme';
        useEffect(theme);
      "#,
    );

    assert!(output.starts_with("var _react = require(\"react\");\nvar _theme = require(\"../theme\");"), "{output}");
    assert!(output.contains("var _themeDefault = _theme && _theme.__esModule ? _theme : {"), "{output}");
    assert!(output.contains("_react[\"useEffect\"]"), "{output}");
    assert!(output.contains("_themeDefault[\"default\"]"), "{output}");
    assert!(!output.contains("import"), "{output}");
  }

  #[test]
  fn test_exports_are_published_on_exports() {
    let output = transform(
      r#"
        export const color = 'red';
        export function size() { return 1; }
        export default 'x';
      "#,
    );

    assert!(
      output.starts_with("Object.defineProperty(exports, \"__esModule\", {"),
      "{output}"
    );
    assert!(output.contains("Object.defineProperty(exports, \"size\""), "{output}");
    assert!(output.contains("exports[\"color\"] = color;"), "{output}");
    assert!(output.contains("exports[\"default\"] = 'x';"), "{output}");
  }

  #[test]
  fn test_commonjs_is_left_alone() {
    let output = transform("module.exports = { a: 1 };");
    assert_eq!(output, "module.exports = {\na: 1\n};");
  }
}
