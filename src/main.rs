use std::{env, fs, process};

use classkit_class_file::{queries, ClassFile};

fn main() {
    pretty_env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: classkit <path/to/Some.class>");
        process::exit(2);
    };

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {}: {}", path, e);
            process::exit(1);
        }
    };
    let class_file = match ClassFile::parse(&bytes) {
        Ok(class_file) => class_file,
        Err(e) => {
            eprintln!("Cannot parse {}: {}", path, e);
            process::exit(1);
        }
    };

    if let Err(e) = print_class(&class_file) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn print_class(class_file: &ClassFile) -> classkit_class_file::Result<()> {
    println!("Class: {}", class_file.class_name()?);
    println!(
        "Version: {}.{}",
        class_file.major_version, class_file.minor_version
    );
    println!(
        "Flags: 0x{:04x} [{}]",
        class_file.access_flags.bits(),
        class_file.access_flags.class_modifiers().join(", ")
    );

    let inheritance = queries::inheritance(class_file)?;
    if let Some(super_class) = &inheritance.super_class {
        println!("Super class: {}", super_class);
    }
    for interface in &inheritance.interfaces {
        println!("Implements: {}", interface);
    }

    println!();
    println!("Annotations:");
    for annotation in queries::class_annotations(class_file)? {
        println!("    @{}", annotation.type_descriptor);
        for (name, value) in &annotation.elements {
            println!("        {} = {:?}", name, value);
        }
    }

    println!();
    println!("Constant pool:");
    for entry in queries::constant_pool_entries(class_file)? {
        println!("    #{:<4} {:<20} {}", entry.index, entry.kind, entry.value);
    }

    println!();
    println!("Dependencies:");
    for dependency in queries::dependencies(class_file)? {
        println!("    {}", dependency);
    }

    println!();
    println!("Fields:");
    for field in &class_file.fields {
        println!(
            "    {} {}",
            class_file.field_name(field)?,
            class_file.field_descriptor(field)?
        );
    }

    for (method, summary) in class_file
        .methods
        .iter()
        .zip(queries::methods_info(class_file)?)
    {
        println!();
        println!(
            "Method: {}{} [{}]",
            summary.name,
            summary.descriptor,
            summary.access_flags.method_modifiers().join(", ")
        );
        if let (Some(max_stack), Some(max_locals)) = (summary.max_stack, summary.max_locals) {
            println!(
                "    max_stack={} max_locals={} instructions={}",
                max_stack, max_locals, summary.instruction_count
            );
        }
        for line in queries::disassemble(class_file, method)? {
            println!("    {}", line);
        }

        let variables = queries::local_variables(class_file, method)?;
        if !variables.is_empty() {
            println!("    Local variables:");
        }
        for variable in variables {
            println!(
                "        {} {} (pc {}..{}, slot {})",
                variable.name,
                variable.descriptor,
                variable.start_pc,
                variable.start_pc as u32 + variable.length as u32,
                variable.slot
            );
        }
    }

    Ok(())
}
