use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("\n[port] PANIC!");
    if let Some(location) = info.location() {
        println!(
            "[port] panicked at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    println!("[port] Message: {}", info.message());
    crate::hal::halt()
}
