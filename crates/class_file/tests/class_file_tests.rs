use std::fs;

use classkit_class_file::{
    annotation::AnnotationValue,
    attributes::{StackMapFrame, VerificationType},
    queries, AccessFlags, AttributeInfo, ClassBuilder, ClassFile, ClassFileError, CpInfo,
    Instruction, Opcode, Parser,
};

fn read_class(path: &str) -> Vec<u8> {
    fs::read(format!("tests/classes/{}", path)).unwrap()
}

fn with_class_file(path: &str, f: impl FnOnce(ClassFile)) {
    let _ = pretty_env_logger::try_init();
    f(Parser::new(&read_class(path)).parse().unwrap());
}

fn stack_map_frames(class_file: &ClassFile, name: &str, descriptor: &str) -> Vec<StackMapFrame> {
    let code = class_file
        .find_method(name, descriptor)
        .unwrap()
        .code()
        .unwrap();
    code.attributes
        .iter()
        .find_map(|a| match &a.info {
            AttributeInfo::StackMapTable(frames) => Some(frames.clone()),
            _ => None,
        })
        .unwrap()
}

/// Disassembly with pool indices removed, comparable across pools.
fn symbolic_disassembly(class_file: &ClassFile, name: &str, descriptor: &str) -> Vec<String> {
    let method = class_file.find_method(name, descriptor).unwrap();
    queries::disassemble(class_file, method)
        .unwrap()
        .iter()
        .map(|line| {
            line.split_whitespace()
                .filter(|token| !token.starts_with('#') || token.contains(':'))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// `public class demo/Plain` with a public `name` String field and a public
/// `run()V` method.
///
/// Pool: 1 "demo/Plain", 2 Class #1, 3 "java/lang/Object", 4 Class #3, 5..=9
/// the member names and "Code", then the class attribute names, the code
/// attribute names and finally `constants`, each a raw pool entry.
#[derive(Default)]
struct PlainClass<'a> {
    code: &'a [u8],
    code_attributes: &'a [(&'a str, &'a [u8])],
    class_attributes: &'a [(&'a str, &'a [u8])],
    constants: &'a [&'a [u8]],
}

impl PlainClass<'_> {
    fn to_bytes(&self) -> Vec<u8> {
        let mut utf8s = vec![
            "demo/Plain",
            "java/lang/Object",
            "name",
            "Ljava/lang/String;",
            "run",
            "()V",
            "Code",
        ];
        utf8s.extend(self.class_attributes.iter().map(|(name, _)| *name));
        utf8s.extend(self.code_attributes.iter().map(|(name, _)| *name));

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 49];
        let put_u16 = |out: &mut Vec<u8>, v: u16| out.extend_from_slice(&v.to_be_bytes());
        let put_u32 = |out: &mut Vec<u8>, v: u32| out.extend_from_slice(&v.to_be_bytes());

        let constant_slots: usize = self
            .constants
            .iter()
            .map(|entry| if matches!(entry[0], 5 | 6) { 2 } else { 1 })
            .sum();
        put_u16(&mut out, (3 + utf8s.len() + constant_slots) as u16);
        for (i, s) in utf8s.iter().enumerate() {
            out.push(1);
            put_u16(&mut out, s.len() as u16);
            out.extend_from_slice(s.as_bytes());
            if i < 2 {
                out.push(7);
                put_u16(&mut out, 2 * i as u16 + 1);
            }
        }
        for entry in self.constants {
            out.extend_from_slice(entry);
        }

        put_u16(&mut out, 0x0021);
        put_u16(&mut out, 2);
        put_u16(&mut out, 4);
        put_u16(&mut out, 0);

        put_u16(&mut out, 1);
        for v in [0x0001, 5, 6, 0] {
            put_u16(&mut out, v);
        }

        let code_attributes_len: usize = self
            .code_attributes
            .iter()
            .map(|(_, payload)| 6 + payload.len())
            .sum();
        put_u16(&mut out, 1);
        for v in [0x0001, 7, 8, 1, 9] {
            put_u16(&mut out, v);
        }
        put_u32(
            &mut out,
            (12 + self.code.len() + code_attributes_len) as u32,
        );
        put_u16(&mut out, 4);
        put_u16(&mut out, 1);
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(self.code);
        put_u16(&mut out, 0);
        let first_code_attribute = 10 + self.class_attributes.len() as u16;
        put_u16(&mut out, self.code_attributes.len() as u16);
        for (i, (_, payload)) in self.code_attributes.iter().enumerate() {
            put_u16(&mut out, first_code_attribute + i as u16);
            put_u32(&mut out, payload.len() as u32);
            out.extend_from_slice(payload);
        }

        put_u16(&mut out, self.class_attributes.len() as u16);
        for (i, (_, payload)) in self.class_attributes.iter().enumerate() {
            put_u16(&mut out, 10 + i as u16);
            put_u32(&mut out, payload.len() as u32);
            out.extend_from_slice(payload);
        }
        out
    }
}

fn plain_class(code: &[u8], class_attributes: &[(&str, &[u8])]) -> Vec<u8> {
    PlainClass {
        code,
        class_attributes,
        ..Default::default()
    }
    .to_bytes()
}

#[test]
fn test_super_class() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(Some("java/lang/Object"), class_file.super_class().unwrap())
    });
}

#[test]
fn test_class_name() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!("my/MyClass", class_file.class_name().unwrap())
    });
}

#[test]
fn test_field_name() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "myField",
            class_file.field_name(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_int_field_type() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "I",
            class_file.field_descriptor(&class_file.fields[0]).unwrap()
        )
    });
}

#[test]
fn test_field_access_flags() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            AccessFlags::FINAL | AccessFlags::PRIVATE,
            class_file.fields[0].access_flags
        )
    });
}

#[test]
fn test_constructor_name() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "<init>",
            class_file.method_name(&class_file.methods[0]).unwrap()
        )
    });
}

#[test]
fn test_constructor_descriptor() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "()V",
            class_file
                .method_descriptor(&class_file.methods[0])
                .unwrap()
        )
    });
}

#[test]
fn test_method_name() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "add",
            class_file.method_name(&class_file.methods[1]).unwrap()
        )
    });
}

#[test]
fn test_method_descriptor() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(
            "(I)F",
            class_file
                .method_descriptor(&class_file.methods[1])
                .unwrap()
        )
    });
}

#[test]
fn test_method_access_flags() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(AccessFlags::PUBLIC, class_file.methods[1].access_flags)
    });
}

#[test]
fn test_source_file() {
    with_class_file("my/MyClass.class", |class_file| {
        assert_eq!(Some("MyClass.java"), class_file.source_file().unwrap())
    });
}

#[test]
fn test_method_code() {
    with_class_file("my/MyClass.class", |class_file| {
        let code = class_file.find_method("add", "(I)F").unwrap().code().unwrap();
        assert_eq!(2, code.max_stack);
        assert_eq!(2, code.max_locals);
        assert_eq!(
            vec![
                Instruction::Local {
                    opcode: Opcode::Aload0,
                    slot: 0,
                    wide: false
                },
                Instruction::Field {
                    opcode: Opcode::Getfield,
                    index: 7
                },
                Instruction::Local {
                    opcode: Opcode::Iload1,
                    slot: 1,
                    wide: false
                },
                Instruction::Op(Opcode::Iadd),
                Instruction::Op(Opcode::I2f),
                Instruction::Op(Opcode::Freturn),
            ],
            code.instructions
        );
    });
}

#[test]
fn test_round_trip() {
    for path in [
        "my/MyClass.class",
        "sample/Sample.class",
        "sample/Sample$Inner.class",
        "sample/Sample$Marker.class",
    ] {
        let bytes = read_class(path);
        let class_file = ClassFile::parse(&bytes).unwrap();
        assert_eq!(bytes, class_file.to_bytes().unwrap(), "{}", path);
    }
}

#[test]
fn test_sample_overview() {
    with_class_file("sample/Sample.class", |class_file| {
        assert_eq!((61, 0), (class_file.major_version, class_file.minor_version));
        assert_eq!(4, class_file.fields.len());
        assert_eq!(9, class_file.methods.len());
        assert_eq!(
            vec!["java/lang/Runnable", "java/lang/Comparable"],
            class_file.interface_names().unwrap()
        );
        assert_eq!(Some("Sample.java"), class_file.source_file().unwrap());
        assert_eq!(1, class_file.bootstrap_methods().len());

        let bridge = class_file
            .find_method("compareTo", "(Ljava/lang/Object;)I")
            .unwrap();
        assert!(bridge
            .access_flags
            .contains(AccessFlags::BRIDGE | AccessFlags::SYNTHETIC));
    });
}

#[test]
fn test_switches() {
    with_class_file("sample/Sample.class", |class_file| {
        let classify = class_file.find_method("classify", "(I)I").unwrap();
        assert_eq!(
            Instruction::TableSwitch {
                default: 37,
                low: 0,
                high: 2,
                targets: vec![28, 31, 34],
            },
            classify.code().unwrap().instructions[1]
        );

        let sparse = class_file
            .find_method("sparse", "(I)Ljava/lang/String;")
            .unwrap();
        assert_eq!(
            Instruction::LookupSwitch {
                default: 45,
                pairs: vec![(-50, 42), (1, 36), (1000, 39)],
            },
            sparse.code().unwrap().instructions[1]
        );
    });
}

#[test]
fn test_stack_map_frames() {
    with_class_file("sample/Sample.class", |class_file| {
        assert_eq!(
            vec![
                StackMapFrame::Append {
                    offset_delta: 13,
                    locals: vec![VerificationType::Long, VerificationType::Integer],
                },
                StackMapFrame::Chop {
                    offset_delta: 19,
                    k: 1
                },
            ],
            stack_map_frames(&class_file, "compute", "(JD)J")
        );
    });
}

#[test]
fn test_exception_table() {
    with_class_file("sample/Sample.class", |class_file| {
        let code = class_file
            .find_method("safeDivide", "(II)I")
            .unwrap()
            .code()
            .unwrap();
        let ranges = code
            .exception_table
            .iter()
            .map(|e| (e.start_pc, e.end_pc, e.handler_pc))
            .collect::<Vec<_>>();
        assert_eq!(vec![(0, 4, 16), (0, 4, 33), (16, 20, 33), (33, 35, 33)], ranges);
        assert_eq!(
            "java/lang/ArithmeticException",
            class_file
                .constant_pool
                .class_name(code.exception_table[0].catch_type)
                .unwrap()
        );
        assert_eq!(0, code.exception_table[1].catch_type);
    });
}

#[test]
fn test_local_variables() {
    with_class_file("sample/Sample.class", |class_file| {
        let compute = class_file.find_method("compute", "(JD)J").unwrap();
        let variables = queries::local_variables(&class_file, compute).unwrap();
        assert_eq!(
            vec![
                ("i", 7),
                ("this", 0),
                ("a", 1),
                ("b", 3),
                ("result", 5)
            ],
            variables
                .iter()
                .map(|v| (v.name.as_str(), v.slot))
                .collect::<Vec<_>>()
        );
        assert_eq!("J", variables[4].descriptor);
        assert_eq!((10, 26), (variables[4].start_pc, variables[4].length));
    });
}

#[test]
fn test_annotations() {
    with_class_file("sample/Sample.class", |class_file| {
        let annotations = queries::class_annotations(&class_file).unwrap();
        assert_eq!(1, annotations.len());
        let marker = &annotations[0];
        assert_eq!("Lsample/Sample$Marker;", marker.type_descriptor);
        assert_eq!(
            Some(&AnnotationValue::String("sample".into())),
            marker.element("name")
        );
        assert_eq!(Some(&AnnotationValue::Int(3)), marker.element("level"));
        assert_eq!(
            Some(&AnnotationValue::Array(vec![
                AnnotationValue::String("a".into()),
                AnnotationValue::String("b".into()),
            ])),
            marker.element("tags")
        );
        assert_eq!(
            Some(&AnnotationValue::Enum {
                type_descriptor: "Ljava/lang/annotation/RetentionPolicy;".into(),
                constant: "RUNTIME".into(),
            }),
            marker.element("mode")
        );
        assert_eq!(
            Some(&AnnotationValue::Class("Ljava/lang/String;".into())),
            marker.element("type")
        );

        let counter = class_file.find_field("counter", "I").unwrap();
        let annotations = queries::field_annotations(&class_file, counter).unwrap();
        assert_eq!(
            Some(&AnnotationValue::String("counter".into())),
            annotations[0].element("name")
        );

        let classify = class_file.find_method("classify", "(I)I").unwrap();
        let annotations = queries::method_annotations(&class_file, classify).unwrap();
        assert_eq!("Ljava/lang/Deprecated;", annotations[0].type_descriptor);
        assert!(classify
            .attributes
            .iter()
            .any(|a| a.info == AttributeInfo::Deprecated));
    });
}

#[test]
fn test_annotation_defaults() {
    with_class_file("sample/Sample$Marker.class", |class_file| {
        assert!(class_file
            .access_flags
            .contains(AccessFlags::INTERFACE | AccessFlags::ANNOTATION));
        let level = class_file.find_method("level", "()I").unwrap();
        let default = level
            .attributes
            .iter()
            .find_map(|a| match &a.info {
                AttributeInfo::AnnotationDefault(value) => Some(value),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            AnnotationValue::Int(1),
            default.resolve(&class_file.constant_pool).unwrap()
        );
    });
}

#[test]
fn test_dependencies() {
    with_class_file("sample/Sample.class", |class_file| {
        let dependencies = queries::dependencies(&class_file).unwrap();
        for name in [
            "sample/Sample",
            "java/lang/Object",
            "java/lang/ArithmeticException",
            "java/lang/invoke/LambdaMetafactory",
            "java/util/function/IntSupplier",
        ] {
            assert!(dependencies.contains(name), "{}", name);
        }
    });
}

#[test]
fn test_disassemble() {
    with_class_file("my/MyClass.class", |class_file| {
        let constructor = class_file.find_method("<init>", "()V").unwrap();
        assert_eq!(
            vec![
                "   0: aload_0",
                "   1: invokespecial #1 // java/lang/Object.<init>:()V",
                "   4: aload_0",
                "   5: iconst_1",
                "   6: putfield #7 // my/MyClass.myField:I",
                "   9: return",
            ],
            queries::disassemble(&class_file, constructor).unwrap()
        );
    });
}

#[test]
fn test_methods_info() {
    with_class_file("sample/Sample.class", |class_file| {
        let info = queries::methods_info(&class_file).unwrap();
        let compute = info.iter().find(|m| m.name == "compute").unwrap();
        assert_eq!(Some(4), compute.max_stack);
        assert_eq!(Some(8), compute.max_locals);
        assert_eq!(21, compute.instruction_count);
    });
}

#[test]
fn test_plain_class() {
    let bytes = plain_class(&[0xb1], &[]);
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!("demo/Plain", class_file.class_name().unwrap());
    assert_eq!(1, class_file.fields.len());
    assert_eq!(
        "Ljava/lang/String;",
        class_file.field_descriptor(&class_file.fields[0]).unwrap()
    );
    assert_eq!(1, class_file.methods.len());
    assert_eq!(
        vec![Instruction::Op(Opcode::Return)],
        class_file.methods[0].code().unwrap().instructions
    );
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

#[test]
fn test_unknown_attribute_round_trip() {
    let bytes = plain_class(&[0xb1], &[("Custom", &[1u8, 2, 3][..])]);
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!(
        AttributeInfo::Raw(vec![1, 2, 3]),
        class_file.attributes.iter().next().unwrap().info
    );
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

#[test]
fn test_record_survives_rebuild() {
    // One component `int value` carrying a Deprecated attribute.
    let record = [0u8, 1, 0, 13, 0, 14, 0, 1, 0, 15, 0, 0, 0, 0];
    let bytes = PlainClass {
        code: &[0xb1],
        class_attributes: &[
            ("Record", &record[..]),
            ("SourceDebugExtension", &b"SMAP"[..]),
            ("Custom", &[1u8, 2, 3][..]),
        ],
        constants: &[
            &b"\x01\x00\x05value"[..],
            &b"\x01\x00\x01I"[..],
            &b"\x01\x00\x0aDeprecated"[..],
        ],
        ..Default::default()
    }
    .to_bytes();
    let class_file = ClassFile::parse(&bytes).unwrap();
    assert_eq!(bytes, class_file.to_bytes().unwrap());

    let rebuilt = ClassBuilder::from_class(&class_file)
        .unwrap()
        .build_class()
        .unwrap();
    let pool = &rebuilt.constant_pool;

    // Only the unknown attribute is dropped.
    assert_eq!(2, rebuilt.attributes.len());
    let AttributeInfo::Record(components) = &rebuilt.attributes.iter().next().unwrap().info else {
        panic!("expected a Record attribute first");
    };
    assert_eq!(1, components.len());
    assert_eq!("value", pool.utf8(components[0].name_index).unwrap());
    assert_eq!("I", pool.utf8(components[0].descriptor_index).unwrap());
    let deprecated = components[0].attributes.iter().next().unwrap();
    assert_eq!(AttributeInfo::Deprecated, deprecated.info);
    assert_eq!("Deprecated", pool.utf8(deprecated.name_index).unwrap());
    assert_eq!(
        AttributeInfo::SourceDebugExtension(b"SMAP".to_vec()),
        rebuilt.attributes.iter().nth(1).unwrap().info
    );

    let again = ClassBuilder::from_class(&rebuilt)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(rebuilt.to_bytes().unwrap(), again);
}

#[test]
fn test_frame_encodings_round_trip() {
    let mut code = vec![0x00; 520];
    code.push(0xb1);
    #[rustfmt::skip]
    let frames: &[u8] = &[
        0, 7,
        251, 0, 0,
        247, 0, 1, 1,
        63,
        127, 2,
        249, 0, 63,
        254, 0, 64, 1, 2, 4,
        255, 0, 255, 0, 1, 0, 0, 1, 5,
    ];
    let bytes = PlainClass {
        code: &code,
        code_attributes: &[("StackMapTable", frames)],
        ..Default::default()
    }
    .to_bytes();
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!(
        vec![
            StackMapFrame::SameExtended { offset_delta: 0 },
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: 1,
                stack: VerificationType::Integer
            },
            StackMapFrame::Same { offset_delta: 63 },
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 63,
                stack: VerificationType::Float
            },
            StackMapFrame::Chop {
                offset_delta: 63,
                k: 2
            },
            StackMapFrame::Append {
                offset_delta: 64,
                locals: vec![
                    VerificationType::Integer,
                    VerificationType::Float,
                    VerificationType::Long
                ]
            },
            StackMapFrame::Full {
                offset_delta: 255,
                locals: vec![VerificationType::Top],
                stack: vec![VerificationType::Null]
            },
        ],
        stack_map_frames(&class_file, "run", "()V")
    );
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

#[test]
fn test_long_and_double_constants_round_trip() {
    let long = [&[5u8][..], &(-2i64).to_be_bytes()].concat();
    let double = [&[6u8][..], &1.5f64.to_be_bytes()].concat();
    let bytes = PlainClass {
        code: &[0x14, 0, 10, 0x58, 0x14, 0, 12, 0x58, 0xb1],
        constants: &[&long[..], &double[..]],
        ..Default::default()
    }
    .to_bytes();
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!(CpInfo::Long(-2), class_file.constant_pool[10]);
    assert_eq!(CpInfo::Unusable, class_file.constant_pool[11]);
    assert_eq!(CpInfo::Double(1.5), class_file.constant_pool[12]);
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

#[test]
fn test_wide_instructions_round_trip() {
    let code = [
        0xc4, 0x15, 0x01, 0x00, // wide iload 256
        0x57, // pop
        0xc4, 0x84, 0x01, 0x00, 0xfe, 0xd4, // wide iinc 256 -300
        0xb1,
    ];
    let bytes = plain_class(&code, &[]);
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!(
        vec![
            Instruction::Local {
                opcode: Opcode::Iload,
                slot: 256,
                wide: true
            },
            Instruction::Op(Opcode::Pop),
            Instruction::Increment {
                slot: 256,
                delta: -300,
                wide: true
            },
            Instruction::Op(Opcode::Return),
        ],
        class_file.methods[0].code().unwrap().instructions
    );
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

/// `iconst_0; tableswitch; iconst_0; lookupswitch; return`, every target
/// being the return, after `leading_nops` nops.
fn switch_code(leading_nops: usize) -> Vec<u8> {
    let mut code = vec![0x00; leading_nops];
    let mut jumps = Vec::new();

    for (opcode, operands) in [(0xaa, [0i32, 0]), (0xab, [1, 5])] {
        code.push(0x03);
        let switch = code.len();
        code.push(opcode);
        code.resize((code.len() + 3) / 4 * 4, 0);
        jumps.push((switch, code.len()));
        code.extend_from_slice(&[0; 4]);
        for operand in operands {
            code.extend_from_slice(&operand.to_be_bytes());
        }
        jumps.push((switch, code.len()));
        code.extend_from_slice(&[0; 4]);
    }

    let end = code.len();
    code.push(0xb1);
    for (switch, at) in jumps {
        code[at..at + 4].copy_from_slice(&((end - switch) as i32).to_be_bytes());
    }
    code
}

#[test]
fn test_switch_paddings_round_trip() {
    for leading_nops in 0..4 {
        let bytes = plain_class(&switch_code(leading_nops), &[]);
        let class_file = ClassFile::parse(&bytes).unwrap();
        let instructions = &class_file.methods[0].code().unwrap().instructions;

        assert_eq!(leading_nops + 5, instructions.len());
        assert!(matches!(
            instructions[leading_nops + 1],
            Instruction::TableSwitch { .. }
        ));
        assert!(matches!(
            instructions[leading_nops + 3],
            Instruction::LookupSwitch { .. }
        ));
        assert_eq!(bytes, class_file.to_bytes().unwrap(), "{}", leading_nops);
    }
}

#[test]
fn test_unpaired_surrogate_round_trip() {
    let bytes = PlainClass {
        // ldc #11; pop; return
        code: &[0x12, 11, 0x57, 0xb1],
        constants: &[&[1u8, 0, 3, 0xED, 0xA0, 0x80][..], &[8u8, 0, 10][..]],
        ..Default::default()
    }
    .to_bytes();
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!(
        CpInfo::Utf8Unpaired(vec![0xD800]),
        class_file.constant_pool[10]
    );
    assert_eq!(bytes, class_file.to_bytes().unwrap());
    let entries = queries::constant_pool_entries(&class_file).unwrap();
    assert_eq!("\"\\u{D800}\"", entries[10].value);

    let rebuilt = ClassBuilder::from_class(&class_file)
        .unwrap()
        .build_class()
        .unwrap();
    assert!(rebuilt
        .constant_pool
        .iter()
        .any(|(_, entry)| *entry == CpInfo::Utf8Unpaired(vec![0xD800])));
}

#[test]
fn test_built_class_round_trips() {
    let bytes = ClassBuilder::new("demo/Task")
        .method(AccessFlags::PUBLIC, "run", "()V", |code| {
            code.return_();
        })
        .build()
        .unwrap();
    let class_file = ClassFile::parse(&bytes).unwrap();

    assert_eq!("demo/Task", class_file.class_name().unwrap());
    assert_eq!(Some("java/lang/Object"), class_file.super_class().unwrap());
    assert!(class_file.interfaces.is_empty());
    let run = class_file.find_method("run", "()V").unwrap();
    assert_eq!(AccessFlags::PUBLIC, run.access_flags);
    let code = run.code().unwrap();
    assert_eq!(vec![Instruction::Op(Opcode::Return)], code.instructions);
    assert_eq!((0, 1), (code.max_stack, code.max_locals));
    assert_eq!(bytes, class_file.to_bytes().unwrap());
}

#[test]
fn test_max_stack_of_straight_line_code() {
    let class_file = ClassBuilder::new("demo/Sum")
        .method(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            "sum",
            "()I",
            |code| {
                for i in 1..=5 {
                    code.iconst(i);
                }
                for _ in 0..4 {
                    code.iadd();
                }
                code.ireturn();
            },
        )
        .build_class()
        .unwrap();
    let code = class_file.find_method("sum", "()I").unwrap().code().unwrap();
    assert_eq!(5, code.max_stack);
    assert_eq!(0, code.max_locals);
}

#[test]
fn test_idempotent_flag_change() {
    let original = ClassFile::parse(&read_class("sample/Sample.class")).unwrap();
    let flags = AccessFlags::PUBLIC | AccessFlags::FINAL;

    let once = ClassBuilder::from_class(&original)
        .unwrap()
        .method_flags("classify", "(I)I", flags)
        .build()
        .unwrap();
    let once_class = ClassFile::parse(&once).unwrap();
    let twice = ClassBuilder::from_class(&once_class)
        .unwrap()
        .method_flags("classify", "(I)I", flags)
        .build()
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(
        flags,
        once_class.find_method("classify", "(I)I").unwrap().access_flags
    );
}

#[test]
fn test_rebuild_preserves_members() {
    let original = ClassFile::parse(&read_class("sample/Sample.class")).unwrap();
    let rebuilt = ClassFile::parse(
        &ClassBuilder::from_class(&original)
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap();

    assert_eq!(
        queries::methods_info(&original).unwrap(),
        queries::methods_info(&rebuilt).unwrap()
    );
    assert_eq!(
        queries::class_annotations(&original).unwrap(),
        queries::class_annotations(&rebuilt).unwrap()
    );
    assert_eq!(
        queries::inheritance(&original).unwrap(),
        queries::inheritance(&rebuilt).unwrap()
    );
    assert_eq!(1, rebuilt.bootstrap_methods().len());
    for (name, descriptor) in [
        ("run", "()V"),
        ("safeDivide", "(II)I"),
        ("sparse", "(I)Ljava/lang/String;"),
    ] {
        assert_eq!(
            symbolic_disassembly(&original, name, descriptor),
            symbolic_disassembly(&rebuilt, name, descriptor)
        );
    }

    let frames = stack_map_frames(&rebuilt, "safeDivide", "(II)I");
    let StackMapFrame::SameLocals1StackItem {
        stack: VerificationType::Object { cpool_index },
        ..
    } = &frames[0]
    else {
        panic!("expected a frame with one stack item");
    };
    assert_eq!(
        "java/lang/ArithmeticException",
        rebuilt.constant_pool.class_name(*cpool_index).unwrap()
    );
}

#[test]
fn test_add_field() {
    let original = ClassFile::parse(&read_class("sample/Sample.class")).unwrap();
    let edited = ClassBuilder::from_class(&original)
        .unwrap()
        .field(AccessFlags::PRIVATE | AccessFlags::STATIC, "extra", "J")
        .build_class()
        .unwrap();

    assert_eq!(original.fields.len() + 1, edited.fields.len());
    for (before, after) in original.fields.iter().zip(&edited.fields) {
        assert_eq!(
            original.field_name(before).unwrap(),
            edited.field_name(after).unwrap()
        );
        assert_eq!(
            original.field_descriptor(before).unwrap(),
            edited.field_descriptor(after).unwrap()
        );
        assert_eq!(before.access_flags, after.access_flags);
    }
    let extra = edited.fields.last().unwrap();
    assert_eq!("extra", edited.field_name(extra).unwrap());
}

#[test]
fn test_replace_method_code() {
    let original = ClassFile::parse(&read_class("my/MyClass.class")).unwrap();
    let bytes = ClassBuilder::from_class(&original)
        .unwrap()
        .method_code("add", "(I)F", |code| {
            code.op(Opcode::Fconst0).op(Opcode::Freturn);
        })
        .build()
        .unwrap();
    let edited = ClassFile::parse(&bytes).unwrap();

    let code = edited.find_method("add", "(I)F").unwrap().code().unwrap();
    assert_eq!(
        vec![
            Instruction::Op(Opcode::Fconst0),
            Instruction::Op(Opcode::Freturn)
        ],
        code.instructions
    );
    assert_eq!((1, 2), (code.max_stack, code.max_locals));
    assert_eq!(Some("MyClass.java"), edited.source_file().unwrap());
}

#[test]
fn test_invalid_magic() {
    let mut bytes = read_class("my/MyClass.class");
    bytes[3] = 0xBF;
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(ClassFileError::InvalidMagic(0xCAFEBABF))
    ));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = read_class("my/MyClass.class");
    bytes[6..8].copy_from_slice(&70u16.to_be_bytes());
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(ClassFileError::UnsupportedVersion {
            major: 70,
            minor: 0
        })
    ));
}

#[test]
fn test_truncated_input() {
    let bytes = read_class("my/MyClass.class");
    assert!(matches!(
        ClassFile::parse(&bytes[..bytes.len() - 5]),
        Err(ClassFileError::TruncatedInput { .. })
    ));
    assert!(matches!(
        ClassFile::parse(&bytes[..20]),
        Err(ClassFileError::TruncatedInput { .. })
    ));
}

#[test]
fn test_trailing_data() {
    let mut bytes = read_class("my/MyClass.class");
    let length = bytes.len();
    bytes.push(0);
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(ClassFileError::TrailingData { offset }) if offset == length
    ));
}

#[test]
fn test_unknown_opcode() {
    let bytes = plain_class(&[0xcb], &[]);
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(ClassFileError::UnknownOpcode {
            opcode: 0xcb,
            offset: 0
        })
    ));
}

#[test]
fn test_unbalanced_stack() {
    let result = ClassBuilder::new("demo/Broken")
        .method(AccessFlags::PUBLIC, "run", "()V", |code| {
            code.pop().return_();
        })
        .build();
    assert!(matches!(
        result,
        Err(ClassFileError::UnbalancedStack { offset: 0, .. })
    ));
}

#[test]
fn test_member_not_found() {
    let original = ClassFile::parse(&read_class("my/MyClass.class")).unwrap();
    let result = ClassBuilder::from_class(&original)
        .unwrap()
        .method_code("missing", "()V", |code| {
            code.return_();
        })
        .build();
    assert!(matches!(
        result,
        Err(ClassFileError::MemberNotFound { name, .. }) if name == "missing"
    ));
}
