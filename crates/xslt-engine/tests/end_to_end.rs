//! End-to-end transforms exercised against hand-assembled `CompiledStylesheet`s
//! (no compiler front-end lives in this crate, so these tests build the
//! instruction tree directly via `StylesheetBuilder`) and a real source
//! document parsed through `XmlDocument`.

use std::collections::HashMap;
use std::rc::Rc;

use xpath_expr::{parse_expression, Expression};

use xslt_engine::instruction::{
    AttributeValueTemplate, AvtPart, GroupingSpec, Instruction, SortDataType, SortKey, SortOrder,
    WithParam,
};
use xslt_engine::output::test_support::StringWriter;
use xslt_engine::output::StateMachineSink;
use xslt_engine::stylesheet::{CompiledStylesheet, ParamDecl, Pattern, StylesheetBuilder, TemplateRule};
use xslt_engine::{EngineNode, RunConfig, Transform, Value, XmlDocument};

fn expr(s: &str) -> Rc<Expression> {
    Rc::new(parse_expression(s).expect("valid test expression"))
}

fn avt_literal(s: &str) -> AttributeValueTemplate {
    Rc::from(vec![AvtPart::Literal(Rc::from(s))])
}

fn run_transform(stylesheet: &CompiledStylesheet<'_>, xml: &str) -> String {
    let doc = XmlDocument::parse(xml).expect("valid test xml");
    let root = EngineNode::Source(doc.root_node());
    let transform = Transform::new(stylesheet, RunConfig::default());
    let mut sink = StateMachineSink::new(StringWriter::new());
    transform.run(root, &mut sink).expect("transform succeeds");
    sink.into_writer().into_string()
}

fn bare_template(pattern: Option<Pattern>, declaration_order: usize, body: Vec<Instruction<'static>>) -> TemplateRule<'static> {
    TemplateRule {
        name: None,
        pattern,
        mode: None,
        priority: 0.0,
        declaration_order,
        import_precedence: 0,
        params: Vec::new(),
        body,
        stream_capability: Default::default(),
    }
}

fn item_pattern() -> Pattern {
    Pattern::Name {
        uri: None,
        local: Rc::from("item"),
    }
}

// 1. Tunnel parameters propagate through an intermediate named template that
// never declares them, re-surfacing only where a deeper template actually
// asks for them.
#[test]
fn tunnel_parameter_propagates_through_an_unaware_intermediate_template() {
    let level2 = TemplateRule {
        name: Some(Rc::from("level2")),
        pattern: None,
        mode: None,
        priority: 0.0,
        declaration_order: 2,
        import_precedence: 0,
        params: vec![ParamDecl {
            name: Rc::from("secret"),
            required: false,
            tunnel: true,
            default: None,
        }],
        body: vec![Instruction::ValueOf {
            select: expr("$secret"),
            separator: None,
        }],
        stream_capability: Default::default(),
    };
    let level1 = TemplateRule {
        name: Some(Rc::from("level1")),
        pattern: None,
        mode: None,
        priority: 0.0,
        declaration_order: 1,
        import_precedence: 0,
        params: Vec::new(),
        body: vec![Instruction::CallTemplate {
            name: Rc::from("level2"),
            params: Vec::new(),
        }],
        stream_capability: Default::default(),
    };
    let root = bare_template(
        Some(Pattern::Root),
        0,
        vec![Instruction::CallTemplate {
            name: Rc::from("level1"),
            params: vec![WithParam {
                name: Rc::from("secret"),
                select: expr("'abc'"),
                tunnel: true,
                body: Vec::new(),
            }],
        }],
    );
    let stylesheet = StylesheetBuilder::new()
        .add_template(root)
        .add_template(level1)
        .add_template(level2)
        .build();

    let output = run_transform(&stylesheet, "<doc/>");
    assert_eq!(output, "abc");
}

// 2. Two template rules match the same node; the one with higher import
// precedence wins regardless of declaration order, and its xsl:apply-imports
// resumes the search at the next rule down, never re-matching itself.
#[test]
fn higher_import_precedence_wins_and_apply_imports_resumes_one_level_down() {
    let low = TemplateRule {
        import_precedence: 0,
        ..bare_template(
            Some(item_pattern()),
            0,
            vec![Instruction::Text {
                value: Rc::from("low"),
                disable_output_escaping: false,
            }],
        )
    };
    let high = TemplateRule {
        import_precedence: 1,
        ..bare_template(
            Some(item_pattern()),
            1,
            vec![
                Instruction::Text {
                    value: Rc::from("high"),
                    disable_output_escaping: false,
                },
                Instruction::ApplyImports { params: Vec::new() },
            ],
        )
    };
    let stylesheet = StylesheetBuilder::new().add_template(low).add_template(high).build();

    let output = run_transform(&stylesheet, "<doc><item/></doc>");
    assert_eq!(output, "highlow");
}

// 3. xsl:for-each-group/group-by partitions in first-occurrence order and
// exposes current-group()/current-grouping-key() to the group body.
#[test]
fn for_each_group_groups_by_key_in_first_occurrence_order() {
    let doc_template = bare_template(
        Some(Pattern::Name {
            uri: None,
            local: Rc::from("doc"),
        }),
        0,
        vec![Instruction::ForEachGroup {
            select: expr("item"),
            grouping: GroupingSpec::By(expr("@cat")),
            body: vec![
                Instruction::ValueOf {
                    select: expr("current-grouping-key()"),
                    separator: None,
                },
                Instruction::Text {
                    value: Rc::from(":"),
                    disable_output_escaping: false,
                },
                Instruction::ValueOf {
                    select: expr("count(current-group())"),
                    separator: None,
                },
                Instruction::Text {
                    value: Rc::from(" "),
                    disable_output_escaping: false,
                },
            ],
        }],
    );
    let stylesheet = StylesheetBuilder::new().add_template(doc_template).build();

    let output = run_transform(
        &stylesheet,
        r#"<doc><item cat="a"/><item cat="b"/><item cat="a"/></doc>"#,
    );
    assert_eq!(output, "a:2 b:1 ");
}

// 4. xsl:sort with two keys: primary ascending numeric, secondary descending
// numeric, each item's own key evaluated in its own context.
#[test]
fn sort_with_two_keys_orders_by_primary_then_secondary() {
    let doc_template = bare_template(
        Some(Pattern::Name {
            uri: None,
            local: Rc::from("doc"),
        }),
        0,
        vec![Instruction::ForEach {
            select: expr("item"),
            sort_keys: vec![
                SortKey {
                    select: expr("@a"),
                    data_type: SortDataType::Number,
                    order: SortOrder::Ascending,
                    collation: None,
                    case_order_upper_first: None,
                },
                SortKey {
                    select: expr("@b"),
                    data_type: SortDataType::Number,
                    order: SortOrder::Descending,
                    collation: None,
                    case_order_upper_first: None,
                },
            ],
            body: vec![
                Instruction::ValueOf {
                    select: expr("concat(@a, '-', @b)"),
                    separator: None,
                },
                Instruction::Text {
                    value: Rc::from(" "),
                    disable_output_escaping: false,
                },
            ],
        }],
    );
    let stylesheet = StylesheetBuilder::new().add_template(doc_template).build();

    let output = run_transform(
        &stylesheet,
        r#"<doc><item a="1" b="2"/><item a="1" b="1"/><item a="0" b="5"/></doc>"#,
    );
    assert_eq!(output, "0-5 1-2 1-1 ");
}

// 5. xsl:on-empty's emptiness check is about the captured event sequence, not
// just text: an element carrying only an attribute still counts as
// non-empty, so the fallback never runs.
#[test]
fn on_empty_treats_attribute_only_content_as_non_empty() {
    let item_template = bare_template(
        Some(item_pattern()),
        0,
        vec![Instruction::OnEmpty {
            primary: vec![Instruction::Copy {
                inherit_namespaces: false,
                body: vec![Instruction::Attribute {
                    name: avt_literal("flag"),
                    namespace: None,
                    body: vec![Instruction::Text {
                        value: Rc::from("yes"),
                        disable_output_escaping: false,
                    }],
                }],
            }],
            fallback: vec![Instruction::Text {
                value: Rc::from("EMPTY"),
                disable_output_escaping: false,
            }],
        }],
    );
    let stylesheet = StylesheetBuilder::new().add_template(item_template).build();

    let output = run_transform(&stylesheet, "<doc><item/></doc>");
    assert_eq!(output, "<item flag=\"yes\"/>");
}

// 6. A host application re-entering a named template directly, bypassing
// apply-templates dispatch, still gets its declared param bound from the
// values passed in.
#[test]
fn call_named_template_binds_caller_supplied_params() {
    let greet = TemplateRule {
        name: Some(Rc::from("greet")),
        ..bare_template(
            None,
            0,
            vec![
                Instruction::Text {
                    value: Rc::from("hello "),
                    disable_output_escaping: false,
                },
                Instruction::ValueOf {
                    select: expr("$who"),
                    separator: None,
                },
            ],
        )
    };
    let stylesheet = StylesheetBuilder::new().add_template(greet).build();

    let doc = XmlDocument::parse("<doc/>").expect("valid test xml");
    let root = EngineNode::Source(doc.root_node());
    let transform = Transform::new(&stylesheet, RunConfig::default());
    let mut sink = StateMachineSink::new(StringWriter::new());
    let mut params = HashMap::new();
    params.insert("who".to_string(), Value::from_string("world".to_string()));
    transform
        .call_named_template("greet", root, params, &mut sink)
        .expect("named template call succeeds");
    assert_eq!(sink.into_writer().into_string(), "hello world");
}
