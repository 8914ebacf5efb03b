#[rocket::launch]
fn rocket() -> _ {
    signal_server::build(rocket::Config::figment())
}
