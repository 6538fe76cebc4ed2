// List binfmt_misc entries, with the match details the table view leaves out

fn main() {
    let width = 15;
    for entry in binfmt_misc::entries().unwrap() {
        println!("Entry: {}", entry.name);
        println!("{:>width$}: {}", "State", entry.status.state());
        println!("{:>width$}: {}", "Interpreter", entry.status.interpreter);
        println!("{:>width$}: {}", "Flags", entry.status.flags);
        if let Some(ext) = &entry.status.extension {
            println!("{:>width$}: {}", "Extension", ext);
        }
        if let (Some(offset), Some(magic)) = (entry.status.offset, &entry.status.magic) {
            println!("{:>width$}: {}", "Offset", offset);
            println!("{:>width$}: {:02x?}", "Magic", magic);
        }
        println!();
    }
}
