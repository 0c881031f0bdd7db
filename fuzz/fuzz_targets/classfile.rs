#![no_main]

use libfuzzer_sys::fuzz_target;
use dynsubclass::{
    classfile::{ClassFile, ReadOptions},
    runtime::ClassPool,
    Synthesizer,
};

fuzz_target!(|data: &[u8]| {
    let _ = ClassFile::parse_with(data, ReadOptions::metadata_only());
    let Ok(class) = ClassFile::parse(data) else {
        return;
    };

    // anything that decodes must survive synthesis without panicking
    let Ok(pool) = ClassPool::new() else {
        return;
    };
    if pool.add_class(data.to_vec()).is_ok() {
        let _ = Synthesizer::default().synthesize(&class.this_class, &pool, true);
    }
});
